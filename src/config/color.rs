use crate::foundation::core::Rgb8;

/// Parse a background colour.
///
/// Accepts `r,g,b`, `#rrggbb`, `rgb(r,g,b)` or a colour name. Anything else (including
/// out-of-range components) resolves to white.
pub fn parse_background_color(input: &str) -> Rgb8 {
    let s = input.trim();

    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex).unwrap_or(Rgb8::WHITE);
    }

    let lower = s.to_ascii_lowercase();
    let body = lower
        .strip_prefix("rgb(")
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(&lower);

    if body.contains(',') {
        let parts: Result<Vec<i64>, _> = body.split(',').map(|p| p.trim().parse::<i64>()).collect();
        return parts
            .ok()
            .and_then(|p| Rgb8::from_components(&p).ok())
            .unwrap_or(Rgb8::WHITE);
    }

    named_color(body).unwrap_or(Rgb8::WHITE)
}

fn parse_hex(hex: &str) -> Option<Rgb8> {
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgb8::new(channel(0)?, channel(2)?, channel(4)?))
}

fn named_color(name: &str) -> Option<Rgb8> {
    let c = match name {
        "white" => Rgb8::new(255, 255, 255),
        "black" => Rgb8::new(0, 0, 0),
        "red" => Rgb8::new(255, 0, 0),
        "green" => Rgb8::new(0, 255, 0),
        "blue" => Rgb8::new(0, 0, 255),
        "yellow" => Rgb8::new(255, 255, 0),
        "gray" | "grey" => Rgb8::new(128, 128, 128),
        _ => return None,
    };
    Some(c)
}

use super::*;

#[test]
fn frame_count_rounds_to_nearest() {
    assert_eq!(frame_count(30, 4.0), 120);
    assert_eq!(frame_count(24, 1.5), 36);
    assert_eq!(frame_count(30, 0.51), 15);
    assert_eq!(frame_count(25, 0.0), 0);
}

#[test]
fn frame_time_is_index_over_fps() {
    assert_eq!(FrameIndex(0).time_secs(30), 0.0);
    assert_eq!(FrameIndex(30).time_secs(30), 1.0);
    assert_eq!(FrameIndex(45).time_secs(30), 1.5);
    assert_eq!(FrameIndex(10).time_secs(0), 0.0);
}

#[test]
fn even_ceil_only_touches_odd_dimensions() {
    assert_eq!(Size::new(532, 600).even_ceil(), Size::new(532, 600));
    assert_eq!(Size::new(533, 301).even_ceil(), Size::new(534, 302));
}

#[test]
fn rgb_len_is_three_bytes_per_pixel() {
    assert_eq!(Size::new(4, 2).rgb_len(), 24);
}

#[test]
fn colour_from_components_validates_range() {
    assert_eq!(
        Rgb8::from_components(&[1, 2, 3]).unwrap(),
        Rgb8::new(1, 2, 3)
    );
    assert!(Rgb8::from_components(&[1, 2]).is_err());
    assert!(Rgb8::from_components(&[1, 2, 256]).is_err());
    assert!(Rgb8::from_components(&[-1, 2, 3]).is_err());
}

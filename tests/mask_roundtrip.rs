// Export round trip: a painted mask, binarized and encoded as PNG, must
// decode back to the exact same white/black classification.

use genbrush::io;
use genbrush::ops::mask::MaskBuffer;

#[test]
fn binary_mask_png_round_trip_is_lossless() {
    let mut mask = MaskBuffer::new(120, 90);
    // A mix of gestures: a diagonal stroke, a stamped dot, and a thin line
    // with a low-alpha color (still counts as painted).
    mask.paint_segment((10.0, 10.0), (100.0, 70.0), 14.0, [64, 156, 255, 150]);
    mask.paint_segment((30.0, 80.0), (30.0, 80.0), 8.0, [255, 0, 0, 255]);
    mask.paint_segment((5.0, 85.0), (115.0, 85.0), 2.0, [0, 0, 0, 1]);

    let binary = mask.binary_mask().expect("buffer has area");
    let bytes = io::encode_png(&binary).expect("png encode");
    let decoded = io::decode_image(&bytes).expect("png decode");

    assert_eq!(decoded.dimensions(), binary.dimensions());
    for (x, y, px) in decoded.enumerate_pixels() {
        let painted = mask.as_image().get_pixel(x, y).0[3] > 0;
        let expected = if painted {
            [255u8, 255, 255, 255]
        } else {
            [0, 0, 0, 255]
        };
        assert_eq!(px.0, expected, "pixel ({x},{y}) changed across the round trip");
    }
}

#[test]
fn base64_payload_preserves_the_binary_convention() {
    let mut mask = MaskBuffer::new(40, 40);
    mask.paint_segment((5.0, 20.0), (35.0, 20.0), 10.0, [64, 156, 255, 150]);

    let binary = mask.binary_mask().unwrap();
    let payload = io::png_payload(&binary).unwrap();
    let decoded = io::decode_payload(&payload).unwrap();

    for (x, y, px) in decoded.enumerate_pixels() {
        assert!(
            px.0 == [255, 255, 255, 255] || px.0 == [0, 0, 0, 255],
            "pixel ({x},{y}) is not strictly white or black: {:?}",
            px.0
        );
    }
    assert_eq!(decoded.as_raw(), binary.as_raw());
}

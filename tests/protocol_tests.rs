use pulsebridge::protocol::app::AppCodec;
use pulsebridge::protocol::data::{Color, ColorCommand, WearableCommand, WearableSample};
use pulsebridge::protocol::wearable::WearableCodec;

fn status_frame(payload: &str) -> String {
    format!("$s:{}:{}&", payload.chars().count(), payload)
}

#[test]
fn test_wearable_status_frame_end_to_end() {
    let payload = r#"{"id":1,"heartRate":72,"color":{"r":0,"g":0,"b":0},"timestamp":100}"#;
    let mut codec = WearableCodec::new();
    codec.push_str(&status_frame(payload));

    let sample = codec.decode_sample().expect("decoded sample");
    assert_eq!(sample.id, 1);
    assert_eq!(sample.heart_rate, 72);
    assert_eq!(sample.timestamp, 100);
    assert_eq!(sample.color, Color::default());
    assert_eq!(codec.buffered(), 0);
}

#[test]
fn test_wearable_frame_split_across_reads() {
    let payload = r#"{"id":4,"heartRate":88,"color":{"r":1,"g":2,"b":3},"timestamp":7}"#;
    let frame = status_frame(payload);
    let (first, second) = frame.split_at(frame.len() / 2);

    let mut codec = WearableCodec::new();
    codec.push_str(first);
    assert!(codec.decode_sample().is_none());
    codec.push_str(second);

    let sample = codec.decode_sample().expect("decoded sample");
    assert_eq!(sample.id, 4);
    assert_eq!(sample.color, Color::new(1, 2, 3));
}

#[test]
fn test_wearable_codec_recovers_after_garbage() {
    let payload = r#"{"id":2,"heartRate":65,"color":{"r":0,"g":0,"b":0},"timestamp":1}"#;
    let mut codec = WearableCodec::new();
    codec.push_str("????noise$s:3:ab&"); // bad length, consumed
    codec.push_str(&status_frame(payload));

    // The corrupt frame is discarded; the next call yields the good one.
    assert!(codec.decode_sample().is_none());
    let sample = codec.decode_sample().expect("decoded sample");
    assert_eq!(sample.id, 2);
}

#[test]
fn test_color_command_travels_app_to_wearable_frame() {
    // An app submits a color change as delimited JSON.
    let mut app_codec = AppCodec::new();
    app_codec.push_str(r#"{"id":3,"color":{"r":255,"g":0,"b":128}}X"#);
    let cmd = app_codec.decode_command().expect("decoded command");
    assert_eq!(
        cmd,
        WearableCommand::Color(ColorCommand {
            id: 3,
            color: Color::new(255, 0, 128),
        })
    );

    // The wearable side re-frames it without a type discriminant.
    let wearable_codec = WearableCodec::new();
    let frame = wearable_codec.encode_command(&cmd).unwrap();
    assert!(frame.starts_with("$c:"));
    assert!(frame.ends_with('&'));
    assert!(!frame.contains("\"type\""));

    let mut round_trip = WearableCodec::new();
    round_trip.push_str(&frame);
    assert_eq!(round_trip.decode_command(), Some(cmd));
}

#[test]
fn test_reassign_command_uses_type_discriminant() {
    let mut app_codec = AppCodec::new();
    app_codec.push_str(r#"{"type":"id","id":3,"newId":9}X"#);
    match app_codec.decode_command() {
        Some(WearableCommand::ReassignId(reassign)) => {
            assert_eq!(reassign.id, 3);
            assert_eq!(reassign.new_id, 9);
        }
        other => panic!("expected reassign command, got {other:?}"),
    }
}

#[test]
fn test_app_egress_message_shape() {
    let sample = WearableSample {
        timestamp: 250,
        id: 6,
        heart_rate: 91,
        color: Color::new(10, 20, 30),
        received_at: None,
    };
    let codec = AppCodec::new();
    let message = codec.encode_sample(&sample).unwrap();
    assert!(message.ends_with('X'));

    let json: serde_json::Value = serde_json::from_str(&message[..message.len() - 1]).unwrap();
    assert_eq!(json["heartRate"], 91);
    assert_eq!(json["timestamp"], 250);
    assert_eq!(json["color"]["g"], 20);
}

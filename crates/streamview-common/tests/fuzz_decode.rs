use rand::{thread_rng, Rng};
use streamview_common::{decode, encode, DecodeError, SessionDescription, SignalingMessage};

#[test]
fn fuzz_decode_random_text_never_panics() {
    let mut rng = thread_rng();
    for _ in 0..10_000 {
        let len: usize = rng.gen_range(0..512);
        let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        let text = String::from_utf8_lossy(&data);
        let _ = decode(&text);
    }
}

#[test]
fn truncated_valid_frames_are_malformed() {
    let frame = encode(&SignalingMessage::Sdp(SessionDescription::offer(
        "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\n",
    )));
    for cut in 0..frame.len() {
        assert!(
            matches!(decode(&frame[..cut]), Err(DecodeError::Malformed(_))),
            "prefix of length {cut} should not decode"
        );
    }
    assert!(decode(&frame).is_ok());
}

#[test]
fn random_mutation_of_valid_frame_is_handled() {
    let mut rng = thread_rng();
    let frame = r#"{"type":"ice","data":{"candidate":"candidate:1 1 udp 2122260223 192.168.1.2 54321 typ host","sdpMLineIndex":0,"sdpMid":"0"}}"#;

    for _ in 0..1_000 {
        let mut mutated = frame.as_bytes().to_vec();
        let flip_count = rng.gen_range(1..6);
        for _ in 0..flip_count {
            let idx = rng.gen_range(0..mutated.len());
            mutated[idx] = rng.gen_range(0x20u8..0x7f);
        }
        let text = String::from_utf8_lossy(&mutated);
        let _ = decode(&text);
    }
}

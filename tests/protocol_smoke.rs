use weighlink_core::core::protocol::{default_auto_order, lookup};
use weighlink_core::{
    build_calibrate, build_tare, decode, detect, CommandError, DecodeError, ProtocolId,
    ProtocolSelector,
};

fn single_mass(id: ProtocolId, raw: &[u8]) -> f64 {
    let readings = decode(id.into(), raw).unwrap();
    assert_eq!(readings.len(), 1, "{id}: {raw:?}");
    readings[0].mass_kg()
}

#[test]
fn documented_samples_decode() {
    let cases: &[(ProtocolId, &[u8], f64)] = &[
        (ProtocolId::MidlMiVda, b"W +123.450 kg\r\n", 123.450),
        (ProtocolId::AnD, b"+0012345\r\n", 12.345),
        (ProtocolId::Sartorius, b"0012345", 12.345),
        (ProtocolId::TokvesSh50, b"ST,GS,  +1.234 kg", 1.234),
        (ProtocolId::Ohaus, b"ST,+00123.45,kg", 123.45),
        (ProtocolId::MikrosimM0601, b"+0001.234 kg", 1.234),
        (ProtocolId::Newton42Ascii, b"N+00012.345 kg\r\n", 12.345),
    ];
    for (id, raw, expected) in cases {
        let mass = single_mass(*id, raw);
        assert!((mass - expected).abs() < 1e-9, "{id}: got {mass}");
    }
}

#[test]
fn detection_keeps_precedence() {
    let name = |line: &str| detect(line).map(|p| p.id());

    assert_eq!(name("W +123.450 kg"), Some(ProtocolId::MidlMiVda));
    assert_eq!(name("+0012345"), Some(ProtocolId::AnD));
    assert_eq!(name("0012345"), Some(ProtocolId::Sartorius));
    assert_eq!(name("ST,GS,  +1.234 kg"), Some(ProtocolId::TokvesSh50));
    assert_eq!(name("ST,+00123.45,kg"), Some(ProtocolId::Ohaus));
    assert_eq!(name("N+00012.345 kg"), Some(ProtocolId::Newton42Ascii));
    assert_eq!(name("Z"), None);
    assert_eq!(name(""), None);

    // binary families are never guessed
    assert!(default_auto_order().all(|p| p.id() != ProtocolId::Newton42Binary));
    assert!(default_auto_order().all(|p| p.id() != ProtocolId::MidlBinary));
}

#[test]
fn auto_decode_matches_explicit() {
    let raw = b"ST,GS,  +1.234 kg\r\n";
    let auto = decode(ProtocolSelector::Auto, raw).unwrap();
    let explicit = decode(ProtocolId::TokvesSh50.into(), raw).unwrap();
    assert_eq!(auto, explicit);

    assert_eq!(
        decode(ProtocolSelector::Auto, b"garbage"),
        Err(DecodeError::NotAWeightFrame)
    );
}

#[test]
fn binary_frames() {
    let bin = ProtocolSelector::Explicit(ProtocolId::Newton42Binary);

    let readings = decode(bin, &[0xc0, 0x01, 0x00, 0x00]).unwrap();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].mass_kg(), 1.0);
    assert!(readings[0].is_stable());
    assert_eq!(readings[0].channel(), 0);

    let negative = decode(bin, &[0xc0, 0x01, 0x00, 0x40]).unwrap();
    assert_eq!(negative[0].mass_kg(), -1.0);

    assert_eq!(
        decode(bin, &[0x81, 0x01, 0x00, 0x00]),
        Err(DecodeError::Truncated {
            needed: 7,
            available: 4
        })
    );
    assert!(matches!(
        decode(bin, &[0xc0, 0x81, 0x00, 0x00]),
        Err(DecodeError::Malformed(_))
    ));
    assert_eq!(decode(bin, b"Z\r\n"), Err(DecodeError::NotAWeightFrame));
}

#[test]
fn decoding_is_idempotent() {
    for protocol in weighlink_core::core::protocol::all() {
        if !protocol.is_detectable() {
            continue;
        }
        let raw = protocol.sample().as_bytes();
        assert_eq!(protocol.decode(raw), protocol.decode(raw), "{protocol}");
    }
}

#[test]
fn calibration_round_trip() {
    let midl = lookup("MIDL").unwrap();
    let cmd = build_calibrate(midl, 12.5).unwrap();
    assert_eq!(&cmd[..], b"CAL 12.500\r\n");

    let text = std::str::from_utf8(&cmd).unwrap();
    let value: f64 = text.trim_end().trim_start_matches("CAL ").parse().unwrap();
    assert!((value - 12.5).abs() < 1e-3);

    let newton = ProtocolId::Newton42Binary.protocol();
    let cmd = build_calibrate(newton, 12.5).unwrap();
    let grams = u32::from_le_bytes([cmd[2], cmd[3], cmd[4], 0]);
    assert_eq!(grams, 12_500);
}

#[test]
fn invalid_calibration_is_rejected() {
    for protocol in weighlink_core::core::protocol::all() {
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                build_calibrate(protocol, bad),
                Err(CommandError::InvalidArgument(_))
            ));
        }
    }
    assert!(matches!(
        build_calibrate(ProtocolId::MidlBinary.protocol(), 1.0),
        Err(CommandError::Unsupported { .. })
    ));
}

#[test]
fn tare_commands() {
    assert_eq!(&build_tare(ProtocolId::MidlMiVda.protocol())[..], b"Z\r\n");
    assert_eq!(&build_tare(ProtocolId::Sartorius.protocol())[..], b"T\r\n");
    assert_eq!(
        &build_tare(ProtocolId::Newton42Binary.protocol())[..],
        &[0x80, b'Z', b'\r', b'\n']
    );
}

//! Property-based tests for the QR text codec.

use proptest::prelude::*;

use hcert_verify_core::base45;
use hcert_verify_core::{decode_raw_token, encode_raw_token, VerifyError};

/// Strategy for arbitrary byte arrays.
fn byte_array() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 200,
        ..ProptestConfig::default()
    })]

    /// Decoding inverts encoding.
    #[test]
    fn base45_round_trip(data in byte_array()) {
        prop_assert_eq!(base45::decode(&base45::encode(&data)).unwrap(), data);
    }

    /// Encoded length is 3 symbols per byte pair plus 2 for a trailing byte.
    #[test]
    fn base45_length(data in byte_array()) {
        let expected = data.len() / 2 * 3 + (data.len() % 2) * 2;
        prop_assert_eq!(base45::encode(&data).len(), expected);
    }

    /// The raw token wrapper inverts itself for any payload.
    #[test]
    fn raw_token_round_trip(data in byte_array()) {
        let qr = encode_raw_token(&data, "HC1:").unwrap();
        prop_assert!(qr.starts_with("HC1:"));
        prop_assert_eq!(decode_raw_token(&qr, "HC1:", 1024).unwrap(), data);
    }
}

#[test]
fn test_known_vectors() {
    assert_eq!(base45::encode(b"AB"), "BB8");
    assert_eq!(base45::encode(b"Hello!!"), "%69 VD92EX0");
    assert_eq!(base45::encode(b"base-45"), "UJCLQE7W581");
    assert_eq!(base45::decode("QED8WEX0").unwrap(), b"ietf!");
}

#[test]
fn test_invalid_text_rejected() {
    // Lowercase is outside the alphabet
    assert!(matches!(base45::decode("bb8"), Err(VerifyError::Base45Decode { .. })));
    // A single trailing symbol cannot encode a byte
    assert!(matches!(base45::decode("BB8A"), Err(VerifyError::Base45Decode { .. })));
    // ":::" is 44 + 44*45 + 44*2025 = 91124 > 0xFFFF
    assert!(matches!(base45::decode(":::"), Err(VerifyError::Base45Decode { .. })));
}

#[test]
fn test_decompression_bound() {
    let qr = encode_raw_token(&vec![0u8; 4096], "HC1:").unwrap();
    assert!(decode_raw_token(&qr, "HC1:", 4096).is_ok());
    assert!(matches!(
        decode_raw_token(&qr, "HC1:", 4095),
        Err(VerifyError::Decode { .. })
    ));
}

#[test]
fn test_not_zlib_is_decode_error() {
    let qr = format!("HC1:{}", base45::encode(b"definitely not deflate"));
    assert!(matches!(
        decode_raw_token(&qr, "HC1:", 1024),
        Err(VerifyError::Decode { .. })
    ));
}

//! Account-send codec test vectors
//!
//! Fixed ciphertexts for known viewing keys and counters. Any change to the
//! record layout or the keystream breaks these, and with it every history
//! already written by deployed clients.

#[cfg(test)]
mod account_send_vectors {
    use crate::account_send::{
        decrypt_account_data, encrypt_account_data, AccountDataInput, EncryptionParams,
    };
    use crate::error::{CountUse, ValidationError};

    const VIEWING_KEY: &str = "0x290a15e2b46811c84a0c26624fd7fdc12e38143ae75518fc48375d41035ec5c1";
    const RECIPIENT: &str = "0x2436012a54c81f2F03e6E3D83090f3F5967bF1B5";
    const PUB_KEY: &str = "0x0476698beebe8ee5c74d8cc50ab84ac301ee8f10af6f28d0ffd6adf4d6d3b9b762d46ca56d3dad2ce13213a6f42278dabbb53259f2d92681ea6a0b98197a719be3";
    const PARTIAL_PUB_KEY: &str = "0x9976698beebe8ee5c74d8cc5";
    const MAX_UINT256: &str =
        "115792089237316195423570985008687907853269984665640564039457584007913129639935";

    struct Vector {
        count: &'static str,
        advanced_mode: bool,
        use_public_key_checked: bool,
        ciphertext: &'static str,
    }

    const VECTORS: [Vector; 5] = [
        Vector {
            count: "0",
            advanced_mode: true,
            use_public_key_checked: true,
            ciphertext: "0x9f3873e440b439d4e7561e70b5db28af7abb67257f6353e8d6e057bd2ed16621",
        },
        Vector {
            count: "1",
            advanced_mode: false,
            use_public_key_checked: false,
            ciphertext: "0xac7a4c827e636bb25fbf1ae604c48f0c035c34f526456dc6264b5ee43e3119f2",
        },
        Vector {
            count: "2",
            advanced_mode: true,
            use_public_key_checked: false,
            ciphertext: "0xb609426a8909759990b22756b7f2ce4f8d5ac4685d6e2c40daa830d059950504",
        },
        Vector {
            count: "3",
            advanced_mode: false,
            use_public_key_checked: true,
            ciphertext: "0xd45ffb2b6d4b4ad3bc0682b111cdbceecac938df0c72a0b0a79f7b6be6cfeb3e",
        },
        Vector {
            count: MAX_UINT256,
            advanced_mode: false,
            use_public_key_checked: true,
            ciphertext: "0x89d8a5695a2d6f5b85b1969c4b1cda3c22c36896d907bb0d35975733f7cab1c1",
        },
    ];

    #[test]
    fn test_raw_record_layout() {
        use crate::account_send::AccountSendCodec;
        use crate::types::Address;
        use hex_literal::hex;
        use primitive_types::U256;

        let codec = AccountSendCodec::new(VIEWING_KEY).unwrap();
        let data = codec.decrypt(
            U256::zero(),
            &hex!("9f3873e440b439d4e7561e70b5db28af7abb67257f6353e8d6e057bd2ed16621"),
        );
        assert_eq!(data.address, Address(hex!("2436012a54c81f2f03e6e3d83090f3f5967bf1b5")));
        assert!(data.advanced_mode);
        assert!(data.use_public_key_checked);
        assert_eq!(data.pub_key_fragment, hex!("76698beebe8ee5c74d8cc5"));
    }

    fn input(advanced_mode: bool, use_public_key_checked: bool) -> AccountDataInput<'static> {
        AccountDataInput {
            recipient_address: RECIPIENT,
            advanced_mode,
            use_public_key_checked,
            pub_key: PUB_KEY,
        }
    }

    fn params(count: &str) -> EncryptionParams<'_> {
        EncryptionParams {
            encryption_count: count,
            viewing_private_key: VIEWING_KEY,
        }
    }

    #[test]
    fn test_encrypt_vectors() {
        for v in &VECTORS {
            let ciphertext =
                encrypt_account_data(&input(v.advanced_mode, v.use_public_key_checked), &params(v.count))
                    .unwrap();
            assert_eq!(ciphertext, v.ciphertext, "count {}", v.count);
        }
    }

    #[test]
    fn test_decrypt_vectors() {
        for v in &VECTORS {
            let data = decrypt_account_data(v.ciphertext, &params(v.count)).unwrap();
            assert_eq!(data.address.to_checksum(), RECIPIENT, "count {}", v.count);
            assert_eq!(data.advanced_mode, v.advanced_mode, "count {}", v.count);
            assert_eq!(data.use_public_key_checked, v.use_public_key_checked, "count {}", v.count);
            assert_eq!(data.pub_key(), PARTIAL_PUB_KEY, "count {}", v.count);
        }
    }

    #[test]
    fn test_hex_count_matches_decimal() {
        let decimal = encrypt_account_data(&input(false, false), &params("1")).unwrap();
        let hex = encrypt_account_data(&input(false, false), &params("0x01")).unwrap();
        assert_eq!(decimal, hex);
    }

    #[test]
    fn test_wrong_count_does_not_decrypt() {
        let data = decrypt_account_data(VECTORS[1].ciphertext, &params("2")).unwrap();
        assert_ne!(data.address.to_checksum(), RECIPIENT);
    }

    /// Addresses with a leading zero byte must survive the round trip intact
    #[test]
    fn test_leading_zero_address_regression() {
        let recipient = "0x00bB833415cf56f112389E146Cb7847dDbE93fB5";
        let pub_key = "0x040426c84897f9e07632687f69ef714090307dcdc23b4a9f3719e6db8eb1f753f71dd4f849c6101d13049f6091944914c31e6fe32db34daa176da230a04de12bf3";
        let params = EncryptionParams {
            encryption_count: "661",
            viewing_private_key: "0xeaa492b979aead8bdaf857673c4fe453a3f7ce5e8d661499391505f47d96d613",
        };
        let input = AccountDataInput {
            recipient_address: recipient,
            advanced_mode: false,
            use_public_key_checked: false,
            pub_key,
        };

        let ciphertext = encrypt_account_data(&input, &params).unwrap();
        assert_eq!(ciphertext.len(), 66);
        let data = decrypt_account_data(&ciphertext, &params).unwrap();
        assert_eq!(data.address.to_checksum(), recipient);
        assert!(!data.advanced_mode);
        assert!(!data.use_public_key_checked);
        assert_eq!(data.pub_key(), "0x990426c84897f9e07632687f");
    }

    #[test]
    fn test_invalid_counts() {
        let too_big =
            "115792089237316195423570985008687907853269984665640564039457584007913129639936";
        for count in ["-1", "", "0x", "abc", "1.5", too_big] {
            assert_eq!(
                encrypt_account_data(&input(true, true), &params(count)).unwrap_err(),
                ValidationError::InvalidCount(CountUse::Encryption),
                "count {count:?}"
            );
            assert_eq!(
                decrypt_account_data(VECTORS[0].ciphertext, &params(count)).unwrap_err(),
                ValidationError::InvalidCount(CountUse::Decryption),
                "count {count:?}"
            );
        }
        assert_eq!(
            ValidationError::InvalidCount(CountUse::Encryption).to_string(),
            "Invalid count provided for encryption"
        );
    }

    #[test]
    fn test_invalid_viewing_keys() {
        let no_prefix = &VIEWING_KEY[2..];
        let short = &VIEWING_KEY[..64];
        for key in ["", "0x", no_prefix, short, "0xzz0a15e2b46811c84a0c26624fd7fdc12e38143ae75518fc48375d41035ec5c1"] {
            let params = EncryptionParams {
                encryption_count: "1",
                viewing_private_key: key,
            };
            assert_eq!(
                encrypt_account_data(&input(true, true), &params).unwrap_err(),
                ValidationError::InvalidViewingKey,
                "key {key:?}"
            );
            assert_eq!(
                decrypt_account_data(VECTORS[0].ciphertext, &params).unwrap_err(),
                ValidationError::InvalidViewingKey,
                "key {key:?}"
            );
        }
    }

    #[test]
    fn test_invalid_ciphertexts() {
        let short = &VECTORS[0].ciphertext[..64];
        let long = format!("{}00", VECTORS[0].ciphertext);
        let no_prefix = &VECTORS[0].ciphertext[2..];
        for ciphertext in ["", "0x", short, long.as_str(), no_prefix] {
            assert_eq!(
                decrypt_account_data(ciphertext, &params("1")).unwrap_err(),
                ValidationError::InvalidCiphertext,
                "ciphertext {ciphertext:?}"
            );
        }
    }

    #[test]
    fn test_invalid_recipient_addresses() {
        for address in ["", "0x", "0x123", "2436012a54c81f2F03e6E3D83090f3F5967bF1B5", "vitalik.eth"] {
            let input = AccountDataInput {
                recipient_address: address,
                ..input(true, true)
            };
            assert_eq!(
                encrypt_account_data(&input, &params("1")).unwrap_err(),
                ValidationError::InvalidRecipientAddress,
                "address {address:?}"
            );
        }
    }

    #[test]
    fn test_invalid_public_keys() {
        let x = &PUB_KEY[4..68];
        let y = &PUB_KEY[68..];
        let compressed_even = format!("0x02{x}");
        let compressed_odd = format!("0x03{x}");
        let short_uncompressed = format!("0x04{x}");
        let wrong_prefix_02 = format!("0x02{x}{y}");
        let wrong_prefix_03 = format!("0x03{x}{y}");
        let wrong_prefix_99 = format!("0x99{x}{y}");
        let off_curve = format!("0x04{x}{}", "11".repeat(32));

        for pub_key in [
            "",
            "0x",
            compressed_even.as_str(),
            compressed_odd.as_str(),
            short_uncompressed.as_str(),
            wrong_prefix_02.as_str(),
            wrong_prefix_03.as_str(),
            wrong_prefix_99.as_str(),
            off_curve.as_str(),
        ] {
            let input = AccountDataInput {
                pub_key,
                ..input(true, true)
            };
            assert_eq!(
                encrypt_account_data(&input, &params("1")).unwrap_err(),
                ValidationError::InvalidRecipientPublicKey,
                "pub key {pub_key:?}"
            );
        }
    }
}

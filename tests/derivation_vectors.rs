//! 密钥派生已知向量
//!
//! 私钥 1、2 和 n-1 的地址与扩展密钥，用独立工具核对过。

use keyscan::domain::{
    codec::ExtKeyFamily,
    convert_to_xpub,
    derivation::{eip55_checksum, snapshot_from_hex, DeriveError},
    ExtendedKey,
};

const XPRV_ONE: &str = "xprv9s21ZrQH143K24Mfq5zL5MhWK9hUhhGbd45hLXo2Pq2oqzMMo63oStZzF93Y5wvzdUayhgkkFoicQZcP3y52uPPxFnfoLZB21TeqtDeZVxb";
const XPUB_ONE: &str = "xpub661MyMwAqRbcEYS8w7XLSVeEsBXy79zSzH1J8vCdxAZningWLdN3zgtU6QzvJsNBNF5QPBBBg1yVF2LKrcfGdJq86PeLWDMUCYatZPzQu8R";
const YPUB_ONE: &str = "ypub6QqdH2c5z7965qdFmUJxeajk39gR3mywuPXWvK6XLAwfmtVjbHXcckYc7cxWJn26mtCD8emk8gL38JwtaK5HRYWixjLm68AxUGeXwvkxrFF";
const ZPUB_ONE: &str = "zpub6jftahH18ngZw8pNbq6arfqFD7przPySpW3jhhzQiBKYpzJxqwhBEpCk8pv6Jgg2BXK1t8NJbLgb1bZTJ1VJDnCKq53Bg2zSjziBLZ7HLSy";

const N_MINUS_ONE: &str = "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364140";
const N: &str = "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141";

#[test]
fn test_seed_one_snapshot() {
    let s = snapshot_from_hex("1").unwrap();
    assert_eq!(s.xprv, XPRV_ONE);
    assert_eq!(s.xpub, XPUB_ONE);
    assert_eq!(s.ypub, YPUB_ONE);
    assert_eq!(s.zpub, ZPUB_ONE);
    assert_eq!(s.btc_address, "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
    assert_eq!(s.eth_address, "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
}

#[test]
fn test_seed_formats_are_equivalent() {
    let expected = snapshot_from_hex("01").unwrap();
    let padded = format!("{:0>64}", "1");
    for input in ["0x01", "0X01", "  01  ", padded.as_str()] {
        assert_eq!(snapshot_from_hex(input).unwrap(), expected, "input {:?}", input);
    }
}

#[test]
fn test_seed_two_and_curve_edge() {
    let two = snapshot_from_hex("02").unwrap();
    assert_eq!(two.btc_address, "1cMh228HTCiwS8ZsaakH8A8wze1JR5ZsP");
    assert_eq!(two.eth_address, "0x2B5AD5c4795c026514f8317c7a215E218DcCD6cF");

    let last = snapshot_from_hex(N_MINUS_ONE).unwrap();
    assert_eq!(last.btc_address, "1GrLCmVQXoyJXaPJQdqssNqwxvha1eUo2E");
    assert_eq!(last.eth_address, "0x80C0dbf239224071c59dD8970ab9d542E3414aB2");
}

#[test]
fn test_out_of_range_seeds() {
    assert_eq!(snapshot_from_hex("0"), Err(DeriveError::OutOfRange));
    assert_eq!(snapshot_from_hex(""), Err(DeriveError::OutOfRange));
    assert_eq!(snapshot_from_hex(N), Err(DeriveError::OutOfRange));
    assert_eq!(snapshot_from_hex(&"f".repeat(64)), Err(DeriveError::OutOfRange));
    assert_eq!(snapshot_from_hex(&"1".repeat(65)), Err(DeriveError::TooLong));
    assert_eq!(snapshot_from_hex("0xg1"), Err(DeriveError::InvalidHex));
}

#[test]
fn test_extended_keys_share_everything_but_version() {
    let s = snapshot_from_hex("1").unwrap();
    let xpub = ExtendedKey::decode(&s.xpub).unwrap();
    let ypub = ExtendedKey::decode(&s.ypub).unwrap();
    let zpub = ExtendedKey::decode(&s.zpub).unwrap();

    assert_eq!(xpub.family(), Some(ExtKeyFamily::Xpub));
    assert_eq!(ypub.family(), Some(ExtKeyFamily::Ypub));
    assert_eq!(zpub.family(), Some(ExtKeyFamily::Zpub));
    for key in [&xpub, &ypub, &zpub] {
        assert_eq!(key.depth, 0);
        assert_eq!(key.parent_fingerprint, [0u8; 4]);
        assert_eq!(key.child_number, 0);
        assert_eq!(key.chain_code, [0u8; 32]);
        assert_eq!(key.key_data, xpub.key_data);
    }

    let xprv = ExtendedKey::decode(&s.xprv).unwrap();
    assert_eq!(xprv.key_data[0], 0x00);
    assert_eq!(xprv.key_data[32], 0x01);
}

#[test]
fn test_derived_public_keys_normalize_back_to_xpub() {
    let s = snapshot_from_hex("02").unwrap();
    assert_eq!(convert_to_xpub(&s.ypub).unwrap(), s.xpub);
    assert_eq!(convert_to_xpub(&s.zpub).unwrap(), s.xpub);
    assert_eq!(convert_to_xpub(&s.xpub).unwrap(), s.xpub);
}

#[test]
fn test_eth_address_checksum_is_eip55() {
    let s = snapshot_from_hex("1").unwrap();
    let hex = s.eth_address.trim_start_matches("0x");
    assert_eq!(eip55_checksum(&hex.to_lowercase()), hex);
}

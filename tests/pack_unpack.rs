use ft8codec::{pack, unpack, Ft8Error};

fn round_trip(text: &str) -> String {
    unpack(&pack(text).unwrap()).unwrap()
}

#[test]
fn standard_messages_round_trip() {
    for text in [
        "K1ABC W9XYZ FN20",
        "CQ K1ABC FN42",
        "CQ DX K1ABC FN42",
        "CQ 145 K1ABC FN42",
        "QRZ W9XYZ",
        "DE K1ABC",
        "K1ABC W9XYZ -07",
        "K1ABC W9XYZ R+12",
        "K1ABC W9XYZ R FN20",
        "W9XYZ K1ABC RRR",
        "W9XYZ K1ABC RR73",
        "W9XYZ K1ABC 73",
        "K1ABC/R W9XYZ EN37",
        "G4ABC/P PA9XYZ JO22",
        "3DA0XYZ K1ABC",
    ] {
        assert_eq!(round_trip(text), text);
    }
}

#[test]
fn other_variants_round_trip() {
    assert_eq!(round_trip("TNX BOB 73 GL"), "TNX BOB 73 GL");
    assert_eq!(round_trip("123456789ABCDEF012"), "123456789ABCDEF012");
    assert_eq!(round_trip("CQ PJ4/K1ABC"), "CQ PJ4/K1ABC");
    // the hashed call can't be resolved without a table
    assert_eq!(round_trip("<W9XYZ> PJ4/K1ABC RR73"), "<...> PJ4/K1ABC RR73");
    assert_eq!(round_trip("KH1/KH7Z K1ABC"), "KH1/KH7Z <...>");
}

#[test]
fn input_is_normalized() {
    assert_eq!(round_trip("  k1abc   w9xyz fn20 "), "K1ABC W9XYZ FN20");
    assert_eq!(round_trip("K1ABC W9XYZ FN20LX"), "K1ABC W9XYZ FN20");
}

#[test]
fn empty_text_is_invalid() {
    assert!(matches!(pack(""), Err(Ft8Error::InvalidFormat(_))));
    assert!(matches!(pack("   "), Err(Ft8Error::InvalidFormat(_))));
    assert!(matches!(pack("THIS TEXT IS FAR TOO LONG"), Err(Ft8Error::InvalidFormat(_))));
}

#[test]
fn flipped_crc_bit_is_rejected() {
    let bits = pack("K1ABC W9XYZ FN20").unwrap();
    for bit in 77..91 {
        let mut corrupted = bits;
        corrupted[bit / 8] ^= 0x80 >> (bit % 8);
        assert_eq!(unpack(&corrupted), Err(Ft8Error::ChecksumInvalid), "bit {}", bit);
    }

    let mut corrupted = bits;
    corrupted[0] ^= 0x10;
    assert_eq!(unpack(&corrupted), Err(Ft8Error::ChecksumInvalid));
}

#[test]
fn reserved_message_types_are_unknown() {
    // i3 = 7 (bits 74..76) with a valid CRC
    let mut payload = [0u8; 10];
    payload[9] = 0x38;
    let a91 = ft8codec::crc::ftx_add_crc(&payload);
    assert!(matches!(unpack(&a91), Err(Ft8Error::UnknownVariant(_))));
}

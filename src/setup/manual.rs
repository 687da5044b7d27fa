//! Manual pairing code.
//!
//! 11 decimal digits: `digit1(1) ‖ chunk2(5) ‖ chunk3(4) ‖ verhoeff(1)` where
//! `digit1 = (vid_pid_present << 2) | (short_disc >> 2)`,
//! `chunk2 = ((short_disc & 3) << 14) | (passcode & 0x3FFF)`,
//! `chunk3 = (passcode >> 14) & 0x1FFF`, and `short_disc` is the top 4 bits
//! of the 12-bit discriminator.

/// Verhoeff multiplication table (d5 group).
const D: [[u8; 10]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
    [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
    [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
    [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
    [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
    [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
    [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
    [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
    [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
];

/// Verhoeff permutation table.
const P: [[u8; 10]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
    [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
    [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
    [9, 4, 5, 3, 1, 2, 6, 8, 7, 0],
    [4, 2, 8, 6, 5, 7, 3, 9, 0, 1],
    [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
    [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
];

/// Verhoeff inverse table.
const INV: [u8; 10] = [0, 4, 3, 2, 1, 5, 6, 7, 8, 9];

/// Compute the Verhoeff check digit for a digit string.
fn verhoeff_check_digit(digits: &str) -> u8 {
    let mut c = 0u8;
    for (i, ch) in digits.bytes().rev().enumerate() {
        let digit = ch - b'0';
        c = D[usize::from(c)][usize::from(P[(i + 1) % 8][usize::from(digit)])];
    }
    INV[usize::from(c)]
}

/// Render the 11-digit manual pairing code for a discriminator/passcode.
pub fn manual_pairing_code(discriminator: u16, passcode: u32) -> String {
    let short_disc = (discriminator >> 8) & 0x0F;
    let digit1 = (short_disc >> 2) & 0x03; // vid_pid_present = 0
    let chunk2 = (u32::from(short_disc & 0x03) << 14) | (passcode & 0x3FFF);
    let chunk3 = (passcode >> 14) & 0x1FFF;

    let body = format!("{digit1}{chunk2:05}{chunk3:04}");
    let check = verhoeff_check_digit(&body);
    format!("{body}{check}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_pairing_code() {
        assert_eq!(manual_pairing_code(3840, 20202021), "34970112332");
    }

    #[test]
    fn test_code_shape() {
        let code = manual_pairing_code(0x0ABC, 12345678);
        assert_eq!(code.len(), 11);
        assert!(code.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_verhoeff_detects_single_digit_errors() {
        let code = manual_pairing_code(3840, 20202021);
        let body = &code[..10];
        let check = code.as_bytes()[10] - b'0';
        assert_eq!(verhoeff_check_digit(body), check);

        // flipping any body digit changes the check digit
        for i in 0..10 {
            let mut altered: Vec<u8> = body.bytes().collect();
            altered[i] = b'0' + (altered[i] - b'0' + 1) % 10;
            let altered = String::from_utf8(altered).unwrap();
            assert_ne!(verhoeff_check_digit(&altered), check, "position {i}");
        }
    }

    #[test]
    fn test_discriminator_only_top_bits_used() {
        // codes depend on the top 4 discriminator bits only
        assert_eq!(
            manual_pairing_code(0x0F00, 20202021),
            manual_pairing_code(0x0FFF, 20202021)
        );
        assert_ne!(
            manual_pairing_code(0x0F00, 20202021),
            manual_pairing_code(0x0B00, 20202021)
        );
    }
}

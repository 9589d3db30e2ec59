//! Packed RGB colors.
//!
//! Colors travel through expressions as ordinary numbers so they can be
//! stored, compared and combined like any other value. A color is packed as
//! `r * 65536 + g * 256 + b` with 8-bit channels.

/// Pack three channels into one number.
pub fn pack(r: u8, g: u8, b: u8) -> f64 {
    (u32::from(r) << 16 | u32::from(g) << 8 | u32::from(b)) as f64
}

/// Unpack a number into its channels. Out-of-range input is clamped first.
pub fn unpack(color: f64) -> (u8, u8, u8) {
    let packed = if color.is_nan() {
        0
    } else {
        color.round().clamp(0.0, 16_777_215.0) as u32
    };
    (
        ((packed >> 16) & 0xff) as u8,
        ((packed >> 8) & 0xff) as u8,
        (packed & 0xff) as u8,
    )
}

/// Clamp and round an arbitrary number into a channel.
pub fn channel(value: f64) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, 255.0) as u8
    }
}

/// Parse `#rrggbb` or `#rgb`.
pub fn parse_hex(text: &str) -> Option<f64> {
    let digits = text.strip_prefix('#')?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match digits.len() {
        6 => {
            let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
            let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
            let b = u8::from_str_radix(&digits[4..6], 16).ok()?;
            Some(pack(r, g, b))
        }
        3 => {
            let mut channels = [0u8; 3];
            for (slot, c) in channels.iter_mut().zip(digits.chars()) {
                let nibble = c.to_digit(16)? as u8;
                *slot = nibble * 17;
            }
            Some(pack(channels[0], channels[1], channels[2]))
        }
        _ => None,
    }
}

/// Render a packed color as `#rrggbb`.
pub fn to_hex(color: f64) -> String {
    let (r, g, b) = unpack(color);
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// Linear interpolation between two packed colors, `t` clamped to 0..1.
pub fn lerp(from: f64, to: f64, t: f64) -> f64 {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let (r0, g0, b0) = unpack(from);
    let (r1, g1, b1) = unpack(to);
    let mix = |a: u8, b: u8| channel(f64::from(a) + (f64::from(b) - f64::from(a)) * t);
    pack(mix(r0, r1), mix(g0, g1), mix(b0, b1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex("#ff0000"), Some(pack(255, 0, 0)));
        assert_eq!(parse_hex("#0f0"), Some(pack(0, 255, 0)));
        assert_eq!(parse_hex("ff0000"), None);
        assert_eq!(parse_hex("#ggg"), None);
        assert_eq!(to_hex(pack(18, 52, 86)), "#123456");
    }

    #[test]
    fn unpack_clamps() {
        assert_eq!(unpack(-5.0), (0, 0, 0));
        assert_eq!(unpack(1.0e12), (255, 255, 255));
    }

    #[test]
    fn lerp_midpoint() {
        let black = pack(0, 0, 0);
        let white = pack(255, 255, 255);
        assert_eq!(unpack(lerp(black, white, 0.5)), (128, 128, 128));
        assert_eq!(lerp(black, white, 2.0), white);
    }
}

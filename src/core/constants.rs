//! Constants for the DWARF encodings the decoder understands.
//!
//! Each constant class is a newtype over its encoded width so unknown values
//! coming out of a byte stream stay representable and printable in errors.

use std::fmt;

macro_rules! dw {
    ($(#[$meta:meta])* $name:ident($ty:ty) { $($(#[$cmeta:meta])* $const_name:ident = $val:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $ty);

        $(
            $(#[$cmeta])*
            pub const $const_name: $name = $name($val);
        )+

        impl $name {
            /// The name of the constant, if it is known.
            pub fn static_string(&self) -> Option<&'static str> {
                Some(match self.0 {
                    $($val => stringify!($const_name),)+
                    _ => return None,
                })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.static_string() {
                    Some(s) => f.pad(s),
                    None => write!(f, "{}(0x{:x})", stringify!($name), self.0),
                }
            }
        }
    };
}

dw!(
/// Attribute form encodings (DWARF v5 section 7.5.6).
DwForm(u16) {
    DW_FORM_addr = 0x01,
    DW_FORM_block2 = 0x03,
    DW_FORM_block4 = 0x04,
    DW_FORM_data2 = 0x05,
    DW_FORM_data4 = 0x06,
    DW_FORM_data8 = 0x07,
    DW_FORM_string = 0x08,
    DW_FORM_block = 0x09,
    DW_FORM_block1 = 0x0a,
    DW_FORM_data1 = 0x0b,
    DW_FORM_flag = 0x0c,
    DW_FORM_sdata = 0x0d,
    DW_FORM_strp = 0x0e,
    DW_FORM_udata = 0x0f,
    DW_FORM_ref_addr = 0x10,
    DW_FORM_ref1 = 0x11,
    DW_FORM_ref2 = 0x12,
    DW_FORM_ref4 = 0x13,
    DW_FORM_ref8 = 0x14,
    DW_FORM_ref_udata = 0x15,
    DW_FORM_indirect = 0x16,
    DW_FORM_sec_offset = 0x17,
    DW_FORM_exprloc = 0x18,
    DW_FORM_flag_present = 0x19,
    DW_FORM_strx = 0x1a,
    DW_FORM_addrx = 0x1b,
    DW_FORM_ref_sup4 = 0x1c,
    DW_FORM_strp_sup = 0x1d,
    DW_FORM_data16 = 0x1e,
    DW_FORM_line_strp = 0x1f,
    DW_FORM_ref_sig8 = 0x20,
    DW_FORM_implicit_const = 0x21,
    DW_FORM_loclistx = 0x22,
    DW_FORM_rnglistx = 0x23,
    DW_FORM_ref_sup8 = 0x24,
    DW_FORM_strx1 = 0x25,
    DW_FORM_strx2 = 0x26,
    DW_FORM_strx3 = 0x27,
    DW_FORM_strx4 = 0x28,
    DW_FORM_addrx1 = 0x29,
    DW_FORM_addrx2 = 0x2a,
    DW_FORM_addrx3 = 0x2b,
    DW_FORM_addrx4 = 0x2c,
});

dw!(
/// Standard line-number program opcodes (DWARF v5 section 6.2.5.2).
DwLns(u8) {
    DW_LNS_copy = 0x01,
    DW_LNS_advance_pc = 0x02,
    DW_LNS_advance_line = 0x03,
    DW_LNS_set_file = 0x04,
    DW_LNS_set_column = 0x05,
    DW_LNS_negate_stmt = 0x06,
    DW_LNS_set_basic_block = 0x07,
    DW_LNS_const_add_pc = 0x08,
    DW_LNS_fixed_advance_pc = 0x09,
    DW_LNS_set_prologue_end = 0x0a,
    DW_LNS_set_epilogue_begin = 0x0b,
    DW_LNS_set_isa = 0x0c,
});

dw!(
/// Extended line-number program opcodes (DWARF v5 section 6.2.5.3).
DwLne(u8) {
    DW_LNE_end_sequence = 0x01,
    DW_LNE_set_address = 0x02,
    DW_LNE_define_file = 0x03,
    DW_LNE_set_discriminator = 0x04,
    DW_LNE_lo_user = 0x80,
    DW_LNE_hi_user = 0xff,
});

dw!(
/// Range list entry encodings in .debug_rnglists (DWARF v5 section 7.25).
DwRle(u8) {
    DW_RLE_end_of_list = 0x00,
    DW_RLE_base_addressx = 0x01,
    DW_RLE_startx_endx = 0x02,
    DW_RLE_startx_length = 0x03,
    DW_RLE_offset_pair = 0x04,
    DW_RLE_base_address = 0x05,
    DW_RLE_start_end = 0x06,
    DW_RLE_start_length = 0x07,
});

dw!(
/// Line-number table entry content descriptors (DWARF v5 section 6.2.4.1).
DwLnct(u16) {
    DW_LNCT_path = 0x01,
    DW_LNCT_directory_index = 0x02,
    DW_LNCT_timestamp = 0x03,
    DW_LNCT_size = 0x04,
    DW_LNCT_md5 = 0x05,
    DW_LNCT_lo_user = 0x2000,
    DW_LNCT_hi_user = 0x3fff,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_constants_display_by_name() {
        assert_eq!(DW_FORM_addr.to_string(), "DW_FORM_addr");
        assert_eq!(DW_LNS_copy.to_string(), "DW_LNS_copy");
        assert_eq!(DW_RLE_offset_pair.to_string(), "DW_RLE_offset_pair");
    }

    #[test]
    fn unknown_constants_display_raw_value() {
        assert_eq!(DwForm(0x1fff).to_string(), "DwForm(0x1fff)");
        assert_eq!(DwRle(0x2a).static_string(), None);
    }
}

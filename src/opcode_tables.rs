//! Static opcode metadata for every Z-machine version.
//!
//! An opcode number only means something together with its operand-count
//! family and the story version: 1OP:0x0F is `not` up to version 4 and
//! `call_1n` from version 5, 0OP:0x05 branches in version 3 but stores in
//! version 4. The table is keyed by (family, number) and each entry carries
//! the version range it is valid for. Anything the table does not list for
//! the running version is an illegal instruction.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;

/// Operand-count family of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeFamily {
    Op0,
    Op1,
    Op2,
    Var,
    Ext,
}

impl fmt::Display for OpcodeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpcodeFamily::Op0 => "0OP",
            OpcodeFamily::Op1 => "1OP",
            OpcodeFamily::Op2 => "2OP",
            OpcodeFamily::Var => "VAR",
            OpcodeFamily::Ext => "EXT",
        };
        f.write_str(name)
    }
}

/// The semantic operation an opcode performs once its version is known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // 0OP
    Rtrue,
    Rfalse,
    Print,
    PrintRet,
    Nop,
    Save,
    Restore,
    Restart,
    RetPopped,
    Pop,
    Catch,
    Quit,
    NewLine,
    ShowStatus,
    Verify,
    Piracy,
    // 1OP
    Jz,
    GetSibling,
    GetChild,
    GetParent,
    GetPropLen,
    Inc,
    Dec,
    PrintAddr,
    Call1s,
    RemoveObj,
    PrintObj,
    Ret,
    Jump,
    PrintPaddr,
    Load,
    Not,
    Call1n,
    // 2OP
    Je,
    Jl,
    Jg,
    DecChk,
    IncChk,
    Jin,
    Test,
    Or,
    And,
    TestAttr,
    SetAttr,
    ClearAttr,
    Store,
    InsertObj,
    Loadw,
    Loadb,
    GetProp,
    GetPropAddr,
    GetNextProp,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Call2s,
    Call2n,
    SetColour,
    Throw,
    // VAR
    CallVs,
    Storew,
    Storeb,
    PutProp,
    Read,
    PrintChar,
    PrintNum,
    Random,
    Push,
    Pull,
    SplitWindow,
    SetWindow,
    CallVs2,
    EraseWindow,
    EraseLine,
    SetCursor,
    GetCursor,
    SetTextStyle,
    BufferMode,
    OutputStream,
    InputStream,
    SoundEffect,
    ReadChar,
    ScanTable,
    CallVn,
    CallVn2,
    Tokenise,
    EncodeText,
    CopyTable,
    PrintTable,
    CheckArgCount,
    // EXT
    LogShift,
    ArtShift,
    SetFont,
    DrawPicture,
    PictureData,
    ErasePicture,
    SetMargins,
    SaveUndo,
    RestoreUndo,
    PrintUnicode,
    CheckUnicode,
    SetTrueColour,
    MoveWindow,
    WindowSize,
    WindowStyle,
    GetWindProp,
    ScrollWindow,
    PopStack,
    ReadMouse,
    MouseWindow,
    PushStack,
    PutWindProp,
    PrintForm,
    MakeMenu,
    PictureTable,
    BufferScreen,
}

/// Metadata for one (family, opcode, version range) combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub family: OpcodeFamily,
    pub number: u8,
    pub op: Op,
    pub name: &'static str,
    pub min_version: u8,
    pub max_version: u8,
    /// A store-variable byte follows the operands
    pub store: bool,
    /// Branch byte(s) follow the operands (and the store byte, if any)
    pub branch: bool,
    /// An inline Z-encoded string follows
    pub text: bool,
}

impl OpcodeInfo {
    pub fn valid_for(&self, version: u8) -> bool {
        (self.min_version..=self.max_version).contains(&version)
    }
}

const S: u8 = 0b001;
const B: u8 = 0b010;
const T: u8 = 0b100;

const fn entry(
    family: OpcodeFamily,
    number: u8,
    op: Op,
    name: &'static str,
    versions: (u8, u8),
    flags: u8,
) -> OpcodeInfo {
    OpcodeInfo {
        family,
        number,
        op,
        name,
        min_version: versions.0,
        max_version: versions.1,
        store: flags & S != 0,
        branch: flags & B != 0,
        text: flags & T != 0,
    }
}

use OpcodeFamily::{Ext, Op0, Op1, Op2, Var};

const ALL: (u8, u8) = (1, 8);

#[rustfmt::skip]
pub static OPCODES: &[OpcodeInfo] = &[
    // ---- 0OP ----
    entry(Op0, 0x00, Op::Rtrue, "rtrue", ALL, 0),
    entry(Op0, 0x01, Op::Rfalse, "rfalse", ALL, 0),
    entry(Op0, 0x02, Op::Print, "print", ALL, T),
    entry(Op0, 0x03, Op::PrintRet, "print_ret", ALL, T),
    entry(Op0, 0x04, Op::Nop, "nop", ALL, 0),
    entry(Op0, 0x05, Op::Save, "save", (1, 3), B),
    entry(Op0, 0x05, Op::Save, "save", (4, 4), S),
    entry(Op0, 0x06, Op::Restore, "restore", (1, 3), B),
    entry(Op0, 0x06, Op::Restore, "restore", (4, 4), S),
    entry(Op0, 0x07, Op::Restart, "restart", ALL, 0),
    entry(Op0, 0x08, Op::RetPopped, "ret_popped", ALL, 0),
    entry(Op0, 0x09, Op::Pop, "pop", (1, 4), 0),
    entry(Op0, 0x09, Op::Catch, "catch", (5, 8), S),
    entry(Op0, 0x0A, Op::Quit, "quit", ALL, 0),
    entry(Op0, 0x0B, Op::NewLine, "new_line", ALL, 0),
    entry(Op0, 0x0C, Op::ShowStatus, "show_status", (3, 3), 0),
    entry(Op0, 0x0D, Op::Verify, "verify", (3, 8), B),
    entry(Op0, 0x0F, Op::Piracy, "piracy", (5, 8), B),

    // ---- 1OP ----
    entry(Op1, 0x00, Op::Jz, "jz", ALL, B),
    entry(Op1, 0x01, Op::GetSibling, "get_sibling", ALL, S | B),
    entry(Op1, 0x02, Op::GetChild, "get_child", ALL, S | B),
    entry(Op1, 0x03, Op::GetParent, "get_parent", ALL, S),
    entry(Op1, 0x04, Op::GetPropLen, "get_prop_len", ALL, S),
    entry(Op1, 0x05, Op::Inc, "inc", ALL, 0),
    entry(Op1, 0x06, Op::Dec, "dec", ALL, 0),
    entry(Op1, 0x07, Op::PrintAddr, "print_addr", ALL, 0),
    entry(Op1, 0x08, Op::Call1s, "call_1s", (4, 8), S),
    entry(Op1, 0x09, Op::RemoveObj, "remove_obj", ALL, 0),
    entry(Op1, 0x0A, Op::PrintObj, "print_obj", ALL, 0),
    entry(Op1, 0x0B, Op::Ret, "ret", ALL, 0),
    entry(Op1, 0x0C, Op::Jump, "jump", ALL, 0),
    entry(Op1, 0x0D, Op::PrintPaddr, "print_paddr", ALL, 0),
    entry(Op1, 0x0E, Op::Load, "load", ALL, S),
    entry(Op1, 0x0F, Op::Not, "not", (1, 4), S),
    entry(Op1, 0x0F, Op::Call1n, "call_1n", (5, 8), 0),

    // ---- 2OP ----
    entry(Op2, 0x01, Op::Je, "je", ALL, B),
    entry(Op2, 0x02, Op::Jl, "jl", ALL, B),
    entry(Op2, 0x03, Op::Jg, "jg", ALL, B),
    entry(Op2, 0x04, Op::DecChk, "dec_chk", ALL, B),
    entry(Op2, 0x05, Op::IncChk, "inc_chk", ALL, B),
    entry(Op2, 0x06, Op::Jin, "jin", ALL, B),
    entry(Op2, 0x07, Op::Test, "test", ALL, B),
    entry(Op2, 0x08, Op::Or, "or", ALL, S),
    entry(Op2, 0x09, Op::And, "and", ALL, S),
    entry(Op2, 0x0A, Op::TestAttr, "test_attr", ALL, B),
    entry(Op2, 0x0B, Op::SetAttr, "set_attr", ALL, 0),
    entry(Op2, 0x0C, Op::ClearAttr, "clear_attr", ALL, 0),
    entry(Op2, 0x0D, Op::Store, "store", ALL, 0),
    entry(Op2, 0x0E, Op::InsertObj, "insert_obj", ALL, 0),
    entry(Op2, 0x0F, Op::Loadw, "loadw", ALL, S),
    entry(Op2, 0x10, Op::Loadb, "loadb", ALL, S),
    entry(Op2, 0x11, Op::GetProp, "get_prop", ALL, S),
    entry(Op2, 0x12, Op::GetPropAddr, "get_prop_addr", ALL, S),
    entry(Op2, 0x13, Op::GetNextProp, "get_next_prop", ALL, S),
    entry(Op2, 0x14, Op::Add, "add", ALL, S),
    entry(Op2, 0x15, Op::Sub, "sub", ALL, S),
    entry(Op2, 0x16, Op::Mul, "mul", ALL, S),
    entry(Op2, 0x17, Op::Div, "div", ALL, S),
    entry(Op2, 0x18, Op::Mod, "mod", ALL, S),
    entry(Op2, 0x19, Op::Call2s, "call_2s", (4, 8), S),
    entry(Op2, 0x1A, Op::Call2n, "call_2n", (5, 8), 0),
    entry(Op2, 0x1B, Op::SetColour, "set_colour", (5, 8), 0),
    entry(Op2, 0x1C, Op::Throw, "throw", (5, 8), 0),

    // ---- VAR ----
    entry(Var, 0x00, Op::CallVs, "call", (1, 3), S),
    entry(Var, 0x00, Op::CallVs, "call_vs", (4, 8), S),
    entry(Var, 0x01, Op::Storew, "storew", ALL, 0),
    entry(Var, 0x02, Op::Storeb, "storeb", ALL, 0),
    entry(Var, 0x03, Op::PutProp, "put_prop", ALL, 0),
    entry(Var, 0x04, Op::Read, "sread", (1, 4), 0),
    entry(Var, 0x04, Op::Read, "aread", (5, 8), S),
    entry(Var, 0x05, Op::PrintChar, "print_char", ALL, 0),
    entry(Var, 0x06, Op::PrintNum, "print_num", ALL, 0),
    entry(Var, 0x07, Op::Random, "random", ALL, S),
    entry(Var, 0x08, Op::Push, "push", ALL, 0),
    entry(Var, 0x09, Op::Pull, "pull", (1, 5), 0),
    entry(Var, 0x09, Op::Pull, "pull", (6, 6), S),
    entry(Var, 0x09, Op::Pull, "pull", (7, 8), 0),
    entry(Var, 0x0A, Op::SplitWindow, "split_window", (3, 8), 0),
    entry(Var, 0x0B, Op::SetWindow, "set_window", (3, 8), 0),
    entry(Var, 0x0C, Op::CallVs2, "call_vs2", (4, 8), S),
    entry(Var, 0x0D, Op::EraseWindow, "erase_window", (4, 8), 0),
    entry(Var, 0x0E, Op::EraseLine, "erase_line", (4, 8), 0),
    entry(Var, 0x0F, Op::SetCursor, "set_cursor", (4, 8), 0),
    entry(Var, 0x10, Op::GetCursor, "get_cursor", (4, 8), 0),
    entry(Var, 0x11, Op::SetTextStyle, "set_text_style", (4, 8), 0),
    entry(Var, 0x12, Op::BufferMode, "buffer_mode", (4, 8), 0),
    entry(Var, 0x13, Op::OutputStream, "output_stream", (3, 8), 0),
    entry(Var, 0x14, Op::InputStream, "input_stream", (3, 8), 0),
    entry(Var, 0x15, Op::SoundEffect, "sound_effect", (3, 8), 0),
    entry(Var, 0x16, Op::ReadChar, "read_char", (4, 8), S),
    entry(Var, 0x17, Op::ScanTable, "scan_table", (4, 8), S | B),
    entry(Var, 0x18, Op::Not, "not", (5, 8), S),
    entry(Var, 0x19, Op::CallVn, "call_vn", (5, 8), 0),
    entry(Var, 0x1A, Op::CallVn2, "call_vn2", (5, 8), 0),
    entry(Var, 0x1B, Op::Tokenise, "tokenise", (5, 8), 0),
    entry(Var, 0x1C, Op::EncodeText, "encode_text", (5, 8), 0),
    entry(Var, 0x1D, Op::CopyTable, "copy_table", (5, 8), 0),
    entry(Var, 0x1E, Op::PrintTable, "print_table", (5, 8), 0),
    entry(Var, 0x1F, Op::CheckArgCount, "check_arg_count", (5, 8), B),

    // ---- EXT ----
    entry(Ext, 0x00, Op::Save, "save", (5, 8), S),
    entry(Ext, 0x01, Op::Restore, "restore", (5, 8), S),
    entry(Ext, 0x02, Op::LogShift, "log_shift", (5, 8), S),
    entry(Ext, 0x03, Op::ArtShift, "art_shift", (5, 8), S),
    entry(Ext, 0x04, Op::SetFont, "set_font", (5, 8), S),
    entry(Ext, 0x05, Op::DrawPicture, "draw_picture", (6, 6), 0),
    entry(Ext, 0x06, Op::PictureData, "picture_data", (6, 6), B),
    entry(Ext, 0x07, Op::ErasePicture, "erase_picture", (6, 6), 0),
    entry(Ext, 0x08, Op::SetMargins, "set_margins", (6, 6), 0),
    entry(Ext, 0x09, Op::SaveUndo, "save_undo", (5, 8), S),
    entry(Ext, 0x0A, Op::RestoreUndo, "restore_undo", (5, 8), S),
    entry(Ext, 0x0B, Op::PrintUnicode, "print_unicode", (5, 8), 0),
    entry(Ext, 0x0C, Op::CheckUnicode, "check_unicode", (5, 8), S),
    entry(Ext, 0x0D, Op::SetTrueColour, "set_true_colour", (5, 8), 0),
    entry(Ext, 0x10, Op::MoveWindow, "move_window", (6, 6), 0),
    entry(Ext, 0x11, Op::WindowSize, "window_size", (6, 6), 0),
    entry(Ext, 0x12, Op::WindowStyle, "window_style", (6, 6), 0),
    entry(Ext, 0x13, Op::GetWindProp, "get_wind_prop", (6, 6), S),
    entry(Ext, 0x14, Op::ScrollWindow, "scroll_window", (6, 6), 0),
    entry(Ext, 0x15, Op::PopStack, "pop_stack", (6, 6), 0),
    entry(Ext, 0x16, Op::ReadMouse, "read_mouse", (6, 6), 0),
    entry(Ext, 0x17, Op::MouseWindow, "mouse_window", (6, 6), 0),
    entry(Ext, 0x18, Op::PushStack, "push_stack", (6, 6), B),
    entry(Ext, 0x19, Op::PutWindProp, "put_wind_prop", (6, 6), 0),
    entry(Ext, 0x1A, Op::PrintForm, "print_form", (6, 6), 0),
    entry(Ext, 0x1B, Op::MakeMenu, "make_menu", (6, 6), B),
    entry(Ext, 0x1C, Op::PictureTable, "picture_table", (6, 6), 0),
    entry(Ext, 0x1D, Op::BufferScreen, "buffer_screen", (6, 6), S),
];

lazy_static! {
    static ref OPCODE_INDEX: HashMap<(OpcodeFamily, u8), Vec<&'static OpcodeInfo>> = {
        let mut index: HashMap<(OpcodeFamily, u8), Vec<&'static OpcodeInfo>> = HashMap::new();
        for info in OPCODES.iter() {
            index.entry((info.family, info.number)).or_default().push(info);
        }
        index
    };
}

/// Find the metadata for an opcode in the given story version
pub fn lookup(family: OpcodeFamily, number: u8, version: u8) -> Option<&'static OpcodeInfo> {
    OPCODE_INDEX
        .get(&(family, number))?
        .iter()
        .copied()
        .find(|info| info.valid_for(version))
}

/// Opcodes whose variable form carries two operand-type bytes (up to 8 operands)
pub fn has_double_type_byte(family: OpcodeFamily, number: u8) -> bool {
    family == OpcodeFamily::Var && (number == 0x0C || number == 0x1A)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_and_call_1n_share_an_opcode() {
        let v4 = lookup(Op1, 0x0F, 4).unwrap();
        assert_eq!(v4.op, Op::Not);
        assert!(v4.store);
        let v5 = lookup(Op1, 0x0F, 5).unwrap();
        assert_eq!(v5.op, Op::Call1n);
        assert!(!v5.store);
    }

    #[test]
    fn test_save_changes_from_branch_to_store() {
        let v3 = lookup(Op0, 0x05, 3).unwrap();
        assert!(v3.branch && !v3.store);
        let v4 = lookup(Op0, 0x05, 4).unwrap();
        assert!(v4.store && !v4.branch);
        assert!(lookup(Op0, 0x05, 5).is_none());
        assert_eq!(lookup(Ext, 0x00, 5).unwrap().op, Op::Save);
    }

    #[test]
    fn test_missing_and_version_gated_entries() {
        assert!(lookup(Op2, 0x00, 3).is_none());
        assert!(lookup(Op2, 0x19, 3).is_none());
        assert_eq!(lookup(Op2, 0x19, 4).unwrap().name, "call_2s");
        assert!(lookup(Ext, 0x05, 5).is_none());
        assert!(lookup(Op0, 0x0C, 4).is_none());
        assert_eq!(lookup(Var, 0x00, 3).unwrap().name, "call");
        assert_eq!(lookup(Var, 0x00, 5).unwrap().name, "call_vs");
    }

    #[test]
    fn test_print_opcodes_carry_text() {
        assert!(lookup(Op0, 0x02, 3).unwrap().text);
        assert!(lookup(Op0, 0x03, 8).unwrap().text);
        assert!(!lookup(Op0, 0x0B, 3).unwrap().text);
    }

    #[test]
    fn test_table_has_no_overlapping_version_ranges() {
        for (i, a) in OPCODES.iter().enumerate() {
            for b in OPCODES.iter().skip(i + 1) {
                if a.family == b.family && a.number == b.number {
                    let overlap = a.min_version <= b.max_version && b.min_version <= a.max_version;
                    assert!(!overlap, "{} and {} overlap", a.name, b.name);
                }
            }
        }
    }

    #[test]
    fn test_double_type_byte_opcodes() {
        assert!(has_double_type_byte(Var, 0x0C));
        assert!(has_double_type_byte(Var, 0x1A));
        assert!(!has_double_type_byte(Op2, 0x0C));
        assert!(!has_double_type_byte(Var, 0x00));
    }
}

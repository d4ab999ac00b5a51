use crate::error::{VmError, VmResult};
use crate::memory::Memory;
use crate::opcode_tables::{self, OpcodeFamily, OpcodeInfo};
use log::trace;
use std::fmt::{Display, Error, Formatter};

/// Operand types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// Large constant (2 bytes)
    LargeConstant,
    /// Small constant (1 byte)
    SmallConstant,
    /// Variable number
    Variable,
    /// Omitted (not present)
    Omitted,
}

impl OperandType {
    /// Parse operand type from 2-bit value
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b00 => OperandType::LargeConstant,
            0b01 => OperandType::SmallConstant,
            0b10 => OperandType::Variable,
            _ => OperandType::Omitted,
        }
    }

    /// Get the size in bytes for this operand type
    pub fn size(&self) -> u32 {
        match self {
            OperandType::LargeConstant => 2,
            OperandType::SmallConstant => 1,
            OperandType::Variable => 1,
            OperandType::Omitted => 0,
        }
    }
}

/// A decoded operand. `Variable` operands are resolved against the CPU when
/// the instruction executes; the constants are literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    LargeConstant(u16),
    SmallConstant(u8),
    Variable(u8),
}

impl Operand {
    pub fn operand_type(&self) -> OperandType {
        match self {
            Operand::LargeConstant(_) => OperandType::LargeConstant,
            Operand::SmallConstant(_) => OperandType::SmallConstant,
            Operand::Variable(_) => OperandType::Variable,
        }
    }

    /// The raw 16-bit value as encoded (a variable number for `Variable`)
    pub fn raw(&self) -> u16 {
        match *self {
            Operand::LargeConstant(value) => value,
            Operand::SmallConstant(value) => value as u16,
            Operand::Variable(var) => var as u16,
        }
    }
}

/// Instruction forms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionForm {
    Long,
    Short,
    Extended,
    Variable,
}

/// Opcode number tagged with its operand-count family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Op0(u8),
    Op1(u8),
    Op2(u8),
    Var(u8),
    Ext(u8),
}

impl Opcode {
    pub fn new(family: OpcodeFamily, number: u8) -> Self {
        match family {
            OpcodeFamily::Op0 => Opcode::Op0(number),
            OpcodeFamily::Op1 => Opcode::Op1(number),
            OpcodeFamily::Op2 => Opcode::Op2(number),
            OpcodeFamily::Var => Opcode::Var(number),
            OpcodeFamily::Ext => Opcode::Ext(number),
        }
    }

    pub fn family(&self) -> OpcodeFamily {
        match self {
            Opcode::Op0(_) => OpcodeFamily::Op0,
            Opcode::Op1(_) => OpcodeFamily::Op1,
            Opcode::Op2(_) => OpcodeFamily::Op2,
            Opcode::Var(_) => OpcodeFamily::Var,
            Opcode::Ext(_) => OpcodeFamily::Ext,
        }
    }

    pub fn number(&self) -> u8 {
        match *self {
            Opcode::Op0(n) | Opcode::Op1(n) | Opcode::Op2(n) | Opcode::Var(n) | Opcode::Ext(n) => n,
        }
    }
}

/// Branch information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchInfo {
    /// True if branch on true, false if branch on false
    pub on_true: bool,
    /// 1 or 2
    pub num_offset_bytes: u8,
    /// Address of the first branch byte
    pub offset_field_address: u32,
    /// 0 = return false, 1 = return true, anything else is a jump
    pub offset: i16,
}

/// A decoded Z-Machine instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Address of the first opcode byte
    pub address: u32,
    pub form: InstructionForm,
    pub opcode: Opcode,
    /// Version-resolved metadata for the opcode
    pub info: &'static OpcodeInfo,
    pub operands: Vec<Operand>,
    /// Variable to store result (if applicable)
    pub store_var: Option<u8>,
    /// Branch information (if applicable)
    pub branch: Option<BranchInfo>,
    /// Address of the inline Z-string for print and print_ret
    pub text_addr: Option<u32>,
    /// Total size of instruction in bytes
    pub length: u32,
}

impl Instruction {
    /// Decode the instruction at `addr`. Reads memory only.
    pub fn decode(memory: &Memory, addr: u32, version: u8) -> VmResult<Self> {
        let mut offset = addr;
        let opcode_byte = memory.read_byte(offset)?;
        offset += 1;

        // Determine instruction form from the first byte
        let form = if opcode_byte == 0xBE && version >= 5 {
            InstructionForm::Extended
        } else {
            match opcode_byte >> 6 {
                0b11 => InstructionForm::Variable,
                0b10 => InstructionForm::Short,
                _ => InstructionForm::Long,
            }
        };

        let opcode = match form {
            InstructionForm::Long => Opcode::Op2(opcode_byte & 0x1F),
            InstructionForm::Short => {
                if (opcode_byte >> 4) & 0x03 == 0x03 {
                    Opcode::Op0(opcode_byte & 0x0F)
                } else {
                    Opcode::Op1(opcode_byte & 0x0F)
                }
            }
            InstructionForm::Variable => {
                if opcode_byte & 0x20 == 0 {
                    Opcode::Op2(opcode_byte & 0x1F)
                } else {
                    Opcode::Var(opcode_byte & 0x1F)
                }
            }
            InstructionForm::Extended => {
                let ext_op = memory.read_byte(offset)?;
                offset += 1;
                Opcode::Ext(ext_op)
            }
        };

        let info = opcode_tables::lookup(opcode.family(), opcode.number(), version).ok_or(
            VmError::IllegalInstruction {
                address: addr,
                family: opcode.family(),
                opcode: opcode.number(),
                version,
            },
        )?;

        // Decode operand types
        let mut operand_types = Vec::with_capacity(4);
        match form {
            InstructionForm::Long => {
                // Long form: 2 operands, types in bits 6 and 5
                for mask in [0x40, 0x20] {
                    operand_types.push(if opcode_byte & mask != 0 {
                        OperandType::Variable
                    } else {
                        OperandType::SmallConstant
                    });
                }
            }
            InstructionForm::Short => {
                let op_type = OperandType::from_bits((opcode_byte >> 4) & 0x03);
                if op_type != OperandType::Omitted {
                    operand_types.push(op_type);
                }
            }
            InstructionForm::Variable | InstructionForm::Extended => {
                let type_byte_count =
                    if opcode_tables::has_double_type_byte(opcode.family(), opcode.number()) {
                        2
                    } else {
                        1
                    };
                let mut type_bytes = [0xFFu8; 2];
                for slot in type_bytes.iter_mut().take(type_byte_count) {
                    *slot = memory.read_byte(offset)?;
                    offset += 1;
                }

                // The first Omitted ends the list, even across type bytes
                'types: for &type_byte in type_bytes.iter().take(type_byte_count) {
                    for i in 0..4 {
                        let op_type = OperandType::from_bits(type_byte >> (6 - i * 2));
                        if op_type == OperandType::Omitted {
                            break 'types;
                        }
                        operand_types.push(op_type);
                    }
                }
            }
        }

        // Read operand values
        let mut operands = Vec::with_capacity(operand_types.len());
        for op_type in operand_types {
            let operand = match op_type {
                OperandType::LargeConstant => Operand::LargeConstant(memory.read_word(offset)?),
                OperandType::SmallConstant => Operand::SmallConstant(memory.read_byte(offset)?),
                OperandType::Variable => Operand::Variable(memory.read_byte(offset)?),
                OperandType::Omitted => break,
            };
            offset += op_type.size();
            operands.push(operand);
        }

        let store_var = if info.store {
            let var = memory.read_byte(offset)?;
            offset += 1;
            Some(var)
        } else {
            None
        };

        let branch = if info.branch {
            let offset_field_address = offset;
            let first_byte = memory.read_byte(offset)?;
            offset += 1;

            let on_true = first_byte & 0x80 != 0;
            let (value, num_offset_bytes) = if first_byte & 0x40 != 0 {
                // One byte: unsigned 0-63
                ((first_byte & 0x3F) as i16, 1)
            } else {
                // Two bytes: 14-bit signed
                let second_byte = memory.read_byte(offset)?;
                offset += 1;
                let raw = (((first_byte & 0x3F) as u16) << 8) | second_byte as u16;
                let value = if raw & 0x2000 != 0 {
                    (raw | 0xC000) as i16
                } else {
                    raw as i16
                };
                (value, 2)
            };

            Some(BranchInfo {
                on_true,
                num_offset_bytes,
                offset_field_address,
                offset: value,
            })
        } else {
            None
        };

        let text_addr = if info.text {
            let start = offset;
            offset += inline_string_length(memory, start)?;
            Some(start)
        } else {
            None
        };

        let instruction = Instruction {
            address: addr,
            form,
            opcode,
            info,
            operands,
            store_var,
            branch,
            text_addr,
            length: offset - addr,
        };
        trace!("{:05x}: {}", addr, instruction);
        Ok(instruction)
    }

    /// Address of the instruction that follows this one
    pub fn next_address(&self) -> u32 {
        self.address + self.length
    }

    pub fn name(&self) -> &'static str {
        self.info.name
    }

    /// Where a taken branch lands, if it jumps rather than returns
    pub fn branch_target(&self) -> Option<u32> {
        let branch = self.branch?;
        match branch.offset {
            0 | 1 => None,
            offset => Some((self.next_address() as i64 + offset as i64 - 2) as u32),
        }
    }
}

/// Length in bytes of the Z-string at `addr`: words up to and including the
/// first one with bit 15 set.
pub fn inline_string_length(memory: &Memory, addr: u32) -> VmResult<u32> {
    let mut cursor = addr;
    loop {
        let word = memory.read_word(cursor)?;
        cursor += 2;
        if word & 0x8000 != 0 {
            return Ok(cursor - addr);
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.name())?;

        for (i, op) in self.operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            match op {
                Operand::Variable(0) => f.write_str("sp")?,
                Operand::Variable(var) => write!(f, "V{:02x}", var)?,
                _ => write!(f, "#{:04x}", op.raw())?,
            }
        }

        if let Some(var) = self.store_var {
            if var == 0 {
                write!(f, " -> sp")?;
            } else {
                write!(f, " -> V{:02x}", var)?;
            }
        }

        if let Some(ref branch) = self.branch {
            write!(f, " [{}", if branch.on_true { "TRUE" } else { "FALSE" })?;
            match branch.offset {
                0 => write!(f, " RFALSE]")?,
                1 => write!(f, " RTRUE]")?,
                n => write!(f, " {:+}]", n)?,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode_tables::Op;
    use test_log::test;

    fn memory_with(code: &[u8]) -> Memory {
        let mut bytes = code.to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        Memory::new(bytes)
    }

    #[test]
    fn test_operand_type_from_bits() {
        assert_eq!(OperandType::from_bits(0b00), OperandType::LargeConstant);
        assert_eq!(OperandType::from_bits(0b01), OperandType::SmallConstant);
        assert_eq!(OperandType::from_bits(0b10), OperandType::Variable);
        assert_eq!(OperandType::from_bits(0b11), OperandType::Omitted);
    }

    #[test]
    fn test_decode_jz_short_form() {
        let memory = memory_with(&[0xA0, 0x05, 0xC3]);
        // 0xA0 has a variable-typed operand; the small-constant form is 0x90
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        assert_eq!(inst.form, InstructionForm::Short);
        assert_eq!(inst.opcode, Opcode::Op1(0));
        assert_eq!(inst.info.op, Op::Jz);
        assert_eq!(inst.operands, vec![Operand::Variable(5)]);

        let memory = memory_with(&[0x90, 0x05, 0xC3]);
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        assert_eq!(inst.operands, vec![Operand::SmallConstant(5)]);
        let branch = inst.branch.unwrap();
        assert!(branch.on_true);
        assert_eq!(branch.num_offset_bytes, 1);
        assert_eq!(branch.offset_field_address, 2);
        assert_eq!(branch.offset, 3);
        assert_eq!(inst.length, 3);
    }

    #[test]
    fn test_decode_long_form() {
        // je V01 #78 [TRUE RFALSE]
        let memory = memory_with(&[0x41, 0x01, 0x78, 0xC0]);
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        assert_eq!(inst.form, InstructionForm::Long);
        assert_eq!(inst.opcode, Opcode::Op2(1));
        assert_eq!(
            inst.operands,
            vec![Operand::Variable(1), Operand::SmallConstant(0x78)]
        );
        assert_eq!(inst.branch.unwrap().offset, 0);
        assert_eq!(inst.length, 4);
        assert_eq!(inst.to_string(), "je V01, #0078 [TRUE RFALSE]");
    }

    #[test]
    fn test_decode_variable_form_call() {
        let memory = memory_with(&[
            0xE0, // VAR call
            0x2A, // large, variable, variable, variable
            0x12, 0x34, 0x01, 0x02, 0x00, // operands
            0x10, // store to global 0
        ]);
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        assert_eq!(inst.form, InstructionForm::Variable);
        assert_eq!(
            inst.operands,
            vec![
                Operand::LargeConstant(0x1234),
                Operand::Variable(1),
                Operand::Variable(2),
                Operand::Variable(0),
            ]
        );
        assert_eq!(inst.store_var, Some(0x10));
        assert_eq!(inst.length, 8);
        assert_eq!(inst.next_address(), 8);
        assert_eq!(inst.to_string(), "call #1234, V01, V02, sp -> V10");
    }

    #[test]
    fn test_decode_call_vs2_reads_two_type_bytes() {
        // call_vs2 with 5 small-constant operands
        let memory = memory_with(&[
            0xEC, 0x55, 0x7F, 1, 2, 3, 4, 5, 0x00,
        ]);
        let inst = Instruction::decode(&memory, 0, 5).unwrap();
        assert_eq!(inst.info.op, Op::CallVs2);
        assert_eq!(inst.operands.len(), 5);
        assert_eq!(inst.operands[4], Operand::SmallConstant(5));
        assert_eq!(inst.store_var, Some(0));
        assert_eq!(inst.length, 9);
    }

    #[test]
    fn test_decode_two_byte_negative_branch() {
        // jz #00 [FALSE -2]: 0x3FFE is -2 in 14 bits
        let memory = memory_with(&[0x90, 0x00, 0x3F, 0xFE]);
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        let branch = inst.branch.unwrap();
        assert!(!branch.on_true);
        assert_eq!(branch.num_offset_bytes, 2);
        assert_eq!(branch.offset, -2);
        assert_eq!(inst.length, 4);
        assert_eq!(inst.branch_target(), Some(0));
    }

    #[test]
    fn test_decode_extended_form() {
        // log_shift #0001 #02 -> sp
        let memory = memory_with(&[0xBE, 0x02, 0x1F, 0x00, 0x01, 0x02, 0x00]);
        let inst = Instruction::decode(&memory, 0, 5).unwrap();
        assert_eq!(inst.form, InstructionForm::Extended);
        assert_eq!(inst.opcode, Opcode::Ext(2));
        assert_eq!(inst.info.op, Op::LogShift);
        assert_eq!(
            inst.operands,
            vec![Operand::LargeConstant(1), Operand::SmallConstant(2)]
        );
        assert_eq!(inst.length, 7);
    }

    #[test]
    fn test_print_length_covers_inline_string() {
        // print with a two-word string, then new_line
        let memory = memory_with(&[0xB2, 0x11, 0x22, 0x94, 0xA5, 0xBB]);
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        assert_eq!(inst.opcode, Opcode::Op0(2));
        assert_eq!(inst.text_addr, Some(1));
        assert_eq!(inst.length, 5);
        assert_eq!(inst.next_address(), 5);
    }

    #[test]
    fn test_opcode_meaning_follows_version() {
        let memory = memory_with(&[0x8F, 0x12, 0x34, 0x00]);
        let v4 = Instruction::decode(&memory, 0, 4).unwrap();
        assert_eq!(v4.info.op, Op::Not);
        assert_eq!(v4.store_var, Some(0));
        let v5 = Instruction::decode(&memory, 0, 5).unwrap();
        assert_eq!(v5.info.op, Op::Call1n);
        assert_eq!(v5.store_var, None);
        assert_eq!(v5.length, 3);
    }

    #[test]
    fn test_unknown_opcode_is_illegal() {
        let memory = memory_with(&[0x20, 0x01, 0x02]);
        // 2OP:0 does not exist in any version
        assert_eq!(
            Instruction::decode(&memory, 0, 3),
            Err(VmError::IllegalInstruction {
                address: 0,
                family: OpcodeFamily::Op2,
                opcode: 0,
                version: 3,
            })
        );

        // 0xBE before version 5 is the undefined 0OP:0x0E
        let memory = memory_with(&[0xBE, 0x02, 0x1F]);
        assert!(matches!(
            Instruction::decode(&memory, 0, 4),
            Err(VmError::IllegalInstruction {
                family: OpcodeFamily::Op0,
                opcode: 0x0E,
                ..
            })
        ));
    }

    #[test]
    fn test_decoding_is_pure() {
        let memory = memory_with(&[0x55, 0x10, 0x03, 0x00]);
        let first = Instruction::decode(&memory, 0, 3).unwrap();
        let second = Instruction::decode(&memory, 0, 3).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.info.op, Op::Sub);
    }

    #[test]
    fn test_truncated_instruction_is_out_of_bounds() {
        let memory = Memory::new(vec![0xE0, 0x00]);
        assert!(matches!(
            Instruction::decode(&memory, 0, 3),
            Err(VmError::MemoryOutOfBounds { .. })
        ));
    }
}

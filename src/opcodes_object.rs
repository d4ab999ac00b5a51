/// Object system operations
///
/// This module handles the object opcodes:
/// - Object tree (get_sibling, get_child, get_parent, insert_obj, remove_obj, jin)
/// - Properties (get_prop, put_prop, get_prop_addr, get_next_prop, get_prop_len)
/// - Attributes (test_attr, set_attr, clear_attr)
///
/// The table walking lives in `zobject`; this layer only moves values between
/// operands, store variables and branches. Bad object numbers are tolerated
/// there with a warning rather than stopping the story.
use crate::display_trait::ZMachineDisplay;
use crate::error::VmResult;
use crate::instruction::Instruction;
use crate::interpreter::{arg, ExecutionResult, Interpreter};
use crate::opcode_tables::Op;
use crate::zobject::ObjectSystem;
use log::debug;

impl<D: ZMachineDisplay> Interpreter<D> {
    /// Handle object system opcodes
    pub fn execute_object_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> VmResult<ExecutionResult> {
        let obj = arg(operands, 0);
        let b = arg(operands, 1);
        match inst.info.op {
            // ---- TREE ----
            Op::GetSibling => {
                let sibling = self.vm.get_sibling(obj)?;
                self.store_result(inst, sibling)?;
                self.branch_on(inst, sibling != 0)
            }
            Op::GetChild => {
                let child = self.vm.get_child(obj)?;
                self.store_result(inst, child)?;
                self.branch_on(inst, child != 0)
            }
            Op::GetParent => {
                let parent = self.vm.get_parent(obj)?;
                self.store_result(inst, parent)?;
                Ok(ExecutionResult::Continue)
            }
            Op::Jin => {
                let parent = self.vm.get_parent(obj)?;
                self.branch_on(inst, parent == b)
            }
            Op::RemoveObj => {
                debug!("remove_obj {}", obj);
                self.vm.remove_object(obj)?;
                Ok(ExecutionResult::Continue)
            }
            Op::InsertObj => {
                debug!("insert_obj {} -> {}", obj, b);
                self.vm.insert_object(obj, b)?;
                Ok(ExecutionResult::Continue)
            }

            // ---- ATTRIBUTES ----
            Op::TestAttr => {
                let set = self.vm.test_attribute(obj, b)?;
                self.branch_on(inst, set)
            }
            Op::SetAttr => {
                self.vm.set_attribute(obj, b, true)?;
                Ok(ExecutionResult::Continue)
            }
            Op::ClearAttr => {
                self.vm.set_attribute(obj, b, false)?;
                Ok(ExecutionResult::Continue)
            }

            // ---- PROPERTIES ----
            Op::GetProp => {
                let value = self.vm.get_property(obj, b)?;
                self.store_result(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            Op::GetPropAddr => {
                let addr = self.vm.get_property_addr(obj, b)?;
                self.store_result(inst, addr)?;
                Ok(ExecutionResult::Continue)
            }
            Op::GetNextProp => {
                let next = self.vm.get_next_property(obj, b)?;
                self.store_result(inst, next)?;
                Ok(ExecutionResult::Continue)
            }
            // The operand is a property data address, not an object
            Op::GetPropLen => {
                let len = self.vm.get_property_len(obj)?;
                self.store_result(inst, len)?;
                Ok(ExecutionResult::Continue)
            }
            Op::PutProp => {
                self.vm.put_property(obj, b, arg(operands, 2))?;
                Ok(ExecutionResult::Continue)
            }
            _ => Err(self.illegal(inst)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::display_headless::HeadlessDisplay;
    use crate::test_utils::{ObjectSpec, StoryBuilder};
    use test_log::test;

    /// Room 1 holds 2 then 3; object 4 is loose
    fn world(version: u8, code: &[u8]) -> Interpreter<HeadlessDisplay> {
        let mut code = code.to_vec();
        code.push(0xBA);
        let story = StoryBuilder::new(version)
            .object(ObjectSpec::new(1).child(2).name("room"))
            .object(
                ObjectSpec::new(2)
                    .parent(1)
                    .sibling(3)
                    .attributes(&[4])
                    .property(6, &[0x01, 0x02])
                    .property(2, &[0x09]),
            )
            .object(ObjectSpec::new(3).parent(1))
            .object(ObjectSpec::new(4))
            .main(&code)
            .build();
        let mut interp =
            Interpreter::new(story, EngineConfig::default(), HeadlessDisplay::new()).unwrap();
        interp.run().unwrap();
        interp
    }

    #[test]
    fn test_get_child_stores_and_branches() {
        // get_child #1 -> G10 ?~skip; store G11 #1; skip: quit
        let interp = world(3, &[0x92, 0x01, 0x10, 0x45, 0x0D, 0x11, 0x01]);
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 2);
        assert_eq!(interp.vm.read_global(0x11).unwrap(), 1);

        // get_sibling #3 -> G10 ?skip; store G11 #1
        let interp = world(3, &[0x91, 0x03, 0x10, 0xC5, 0x0D, 0x11, 0x01]);
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 0);
        assert_eq!(interp.vm.read_global(0x11).unwrap(), 1);
    }

    #[test]
    fn test_jin_and_parent() {
        // jin #3 #1 ?skip; store G11 #1; skip: get_parent #2 -> G10
        let interp = world(5, &[0x06, 0x03, 0x01, 0xC5, 0x0D, 0x11, 0x01, 0x93, 0x02, 0x10]);
        assert_eq!(interp.vm.read_global(0x11).unwrap(), 0);
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 1);
    }

    #[test]
    fn test_insert_and_remove() {
        // insert_obj #4 #1; remove_obj #2
        let interp = world(3, &[0x0E, 0x04, 0x01, 0x99, 0x02]);
        assert_eq!(interp.vm.get_child(1).unwrap(), 4);
        assert_eq!(interp.vm.get_sibling(4).unwrap(), 3);
        assert_eq!(interp.vm.get_parent(2).unwrap(), 0);
    }

    #[test]
    fn test_attribute_ops() {
        // set_attr #3 #7; clear_attr #2 #4; test_attr #3 #7 ?skip; store G11 #1
        let interp = world(
            3,
            &[0x0B, 0x03, 0x07, 0x0C, 0x02, 0x04, 0x0A, 0x03, 0x07, 0xC5, 0x0D, 0x11, 0x01],
        );
        assert_eq!(interp.vm.read_global(0x11).unwrap(), 0);
        assert!(!interp.vm.test_attribute(2, 4).unwrap());
    }

    #[test]
    fn test_property_ops() {
        let interp = world(
            5,
            &[
                // get_prop #2 #6 -> G10
                0x11, 0x02, 0x06, 0x10,
                // put_prop #2 #2 #0x55
                0xE3, 0x57, 0x02, 0x02, 0x55,
                // get_prop_addr #2 #6 -> sp; get_prop_len sp -> G11
                0x12, 0x02, 0x06, 0x00, 0xA4, 0x00, 0x11,
                // get_next_prop #2 #0 -> G12
                0x13, 0x02, 0x00, 0x12,
            ],
        );
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 0x0102);
        assert_eq!(interp.vm.get_property(2, 2).unwrap(), 0x55);
        assert_eq!(interp.vm.read_global(0x11).unwrap(), 2);
        assert_eq!(interp.vm.read_global(0x12).unwrap(), 6);
    }

    #[test]
    fn test_object_zero_does_not_stop_the_story() {
        // get_parent #0 -> G10; insert_obj #0 #1
        let interp = world(3, &[0x93, 0x00, 0x10, 0x0E, 0x00, 0x01]);
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 0);
        assert_eq!(interp.vm.get_child(1).unwrap(), 2);
        assert!(!interp.run_state().is_running());
    }
}

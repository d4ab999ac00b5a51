//! Z-Machine object tree and property tables.
//!
//! Versions 1-3: up to 255 objects, 32 attributes, 31 default properties,
//! 9-byte entries with 1-byte links. Versions 4+: up to 65535 objects,
//! 48 attributes, 63 default properties, 14-byte entries with 2-byte links.
//!
//! Stories are known to touch object 0 and missing properties on purpose,
//! so those faults log a warning and produce a fail-safe value instead of
//! stopping the machine. Memory faults still propagate.

use crate::error::VmResult;
use crate::vm::VM;
use log::{debug, warn};

/// Version-dependent shape of the object table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectLayout {
    pub table_addr: u32,
    pub entry_size: u32,
    pub attribute_count: u16,
    pub default_properties: u32,
    /// 1 (v1-3) or 2 (v4+)
    pub link_size: u32,
    pub max_objects: u16,
}

impl ObjectLayout {
    pub fn for_version(version: u8, table_addr: u32) -> Self {
        if version <= 3 {
            ObjectLayout {
                table_addr,
                entry_size: 9,
                attribute_count: 32,
                default_properties: 31,
                link_size: 1,
                max_objects: 255,
            }
        } else {
            ObjectLayout {
                table_addr,
                entry_size: 14,
                attribute_count: 48,
                default_properties: 63,
                link_size: 2,
                max_objects: 0xFFFF,
            }
        }
    }

    fn tree_base(&self) -> u32 {
        self.table_addr + self.default_properties * 2
    }

    fn attribute_bytes(&self) -> u32 {
        self.attribute_count as u32 / 8
    }

    fn parent_offset(&self) -> u32 {
        self.attribute_bytes()
    }

    fn sibling_offset(&self) -> u32 {
        self.attribute_bytes() + self.link_size
    }

    fn child_offset(&self) -> u32 {
        self.attribute_bytes() + 2 * self.link_size
    }

    fn properties_offset(&self) -> u32 {
        self.attribute_bytes() + 3 * self.link_size
    }
}

/// A property found in an object's property list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PropertyEntry {
    number: u8,
    /// Address of the data, past the size byte(s)
    data_addr: u32,
    len: u16,
}

pub trait ObjectSystem {
    fn object_layout(&self) -> ObjectLayout;
    /// Entry address of `obj`, or `None` (with a warning) for illegal numbers
    fn object_addr(&self, obj: u16, context: &str) -> Option<u32>;
    fn get_parent(&self, obj: u16) -> VmResult<u16>;
    fn get_sibling(&self, obj: u16) -> VmResult<u16>;
    fn get_child(&self, obj: u16) -> VmResult<u16>;
    fn test_attribute(&self, obj: u16, attr: u16) -> VmResult<bool>;
    fn set_attribute(&mut self, obj: u16, attr: u16, value: bool) -> VmResult<()>;
    fn remove_object(&mut self, obj: u16) -> VmResult<()>;
    fn insert_object(&mut self, obj: u16, dest: u16) -> VmResult<()>;
    fn get_property(&self, obj: u16, prop: u16) -> VmResult<u16>;
    fn get_property_addr(&self, obj: u16, prop: u16) -> VmResult<u16>;
    fn get_property_len(&self, data_addr: u16) -> VmResult<u16>;
    fn get_next_property(&self, obj: u16, prop: u16) -> VmResult<u16>;
    fn put_property(&mut self, obj: u16, prop: u16, value: u16) -> VmResult<()>;
    /// Address of the encoded short name, if the object has one
    fn short_name_addr(&self, obj: u16) -> VmResult<Option<u32>>;
}

impl VM {
    fn read_link(&self, addr: u32, layout: &ObjectLayout) -> VmResult<u16> {
        if layout.link_size == 1 {
            Ok(self.read_byte(addr)? as u16)
        } else {
            self.read_word(addr)
        }
    }

    fn write_link(&mut self, addr: u32, value: u16, layout: &ObjectLayout) -> VmResult<()> {
        if layout.link_size == 1 {
            self.write_byte(addr, value as u8)
        } else {
            self.write_word(addr, value)
        }
    }

    fn link(&self, obj: u16, offset: fn(&ObjectLayout) -> u32, context: &str) -> VmResult<u16> {
        let layout = self.object_layout();
        match self.object_addr(obj, context) {
            Some(addr) => self.read_link(addr + offset(&layout), &layout),
            None => Ok(0),
        }
    }

    fn set_link(
        &mut self,
        obj: u16,
        offset: fn(&ObjectLayout) -> u32,
        value: u16,
    ) -> VmResult<()> {
        let layout = self.object_layout();
        match self.object_addr(obj, "set_link") {
            Some(addr) => self.write_link(addr + offset(&layout), value, &layout),
            None => Ok(()),
        }
    }

    fn property_table_addr(&self, obj_addr: u32) -> VmResult<u32> {
        let layout = self.object_layout();
        Ok(self.read_word(obj_addr + layout.properties_offset())? as u32)
    }

    /// Parse the size byte(s) of the property at `addr`; `None` at the terminator
    fn property_at(&self, addr: u32) -> VmResult<Option<PropertyEntry>> {
        let size_byte = self.read_byte(addr)?;
        if size_byte == 0 {
            return Ok(None);
        }
        let entry = if self.version() <= 3 {
            PropertyEntry {
                number: size_byte & 0x1F,
                data_addr: addr + 1,
                len: (size_byte >> 5) as u16 + 1,
            }
        } else if size_byte & 0x80 != 0 {
            let len = (self.read_byte(addr + 1)? & 0x3F) as u16;
            PropertyEntry {
                number: size_byte & 0x3F,
                data_addr: addr + 2,
                len: if len == 0 { 64 } else { len },
            }
        } else {
            PropertyEntry {
                number: size_byte & 0x3F,
                data_addr: addr + 1,
                len: if size_byte & 0x40 != 0 { 2 } else { 1 },
            }
        };
        Ok(Some(entry))
    }

    /// First property entry of an object, after its short name
    fn first_property_addr(&self, obj_addr: u32) -> VmResult<u32> {
        let table = self.property_table_addr(obj_addr)?;
        let name_words = self.read_byte(table)? as u32;
        Ok(table + 1 + 2 * name_words)
    }

    fn find_property(&self, obj_addr: u32, prop: u16) -> VmResult<Option<PropertyEntry>> {
        let mut addr = self.first_property_addr(obj_addr)?;
        while let Some(entry) = self.property_at(addr)? {
            if entry.number as u16 == prop {
                return Ok(Some(entry));
            }
            // Properties are stored in descending order
            if (entry.number as u16) < prop {
                break;
            }
            addr = entry.data_addr + entry.len as u32;
        }
        Ok(None)
    }

    fn attribute_location(&self, obj: u16, attr: u16, context: &str) -> Option<(u32, u8)> {
        let layout = self.object_layout();
        if attr >= layout.attribute_count {
            warn!(
                "{}: attribute {} out of range for version {}",
                context,
                attr,
                self.version()
            );
            return None;
        }
        let addr = self.object_addr(obj, context)?;
        Some((addr + attr as u32 / 8, 0x80 >> (attr % 8)))
    }
}

impl ObjectSystem for VM {
    fn object_layout(&self) -> ObjectLayout {
        ObjectLayout::for_version(self.version(), self.header.object_table_addr as u32)
    }

    fn object_addr(&self, obj: u16, context: &str) -> Option<u32> {
        let layout = self.object_layout();
        if obj == 0 || obj > layout.max_objects {
            warn!("{}: illegal object {} at PC {:05x}", context, obj, self.pc);
            return None;
        }
        let addr = layout.tree_base() + (obj as u32 - 1) * layout.entry_size;
        if addr + layout.entry_size > self.memory.len() as u32 {
            warn!("{}: object {} lies outside memory", context, obj);
            return None;
        }
        Some(addr)
    }

    fn get_parent(&self, obj: u16) -> VmResult<u16> {
        self.link(obj, ObjectLayout::parent_offset, "get_parent")
    }

    fn get_sibling(&self, obj: u16) -> VmResult<u16> {
        self.link(obj, ObjectLayout::sibling_offset, "get_sibling")
    }

    fn get_child(&self, obj: u16) -> VmResult<u16> {
        self.link(obj, ObjectLayout::child_offset, "get_child")
    }

    fn test_attribute(&self, obj: u16, attr: u16) -> VmResult<bool> {
        match self.attribute_location(obj, attr, "test_attr") {
            Some((addr, mask)) => Ok(self.read_byte(addr)? & mask != 0),
            None => Ok(false),
        }
    }

    fn set_attribute(&mut self, obj: u16, attr: u16, value: bool) -> VmResult<()> {
        let context = if value { "set_attr" } else { "clear_attr" };
        if let Some((addr, mask)) = self.attribute_location(obj, attr, context) {
            let byte = self.read_byte(addr)?;
            let byte = if value { byte | mask } else { byte & !mask };
            self.write_byte(addr, byte)?;
        }
        Ok(())
    }

    fn remove_object(&mut self, obj: u16) -> VmResult<()> {
        if self.object_addr(obj, "remove_obj").is_none() {
            return Ok(());
        }
        let parent = self.get_parent(obj)?;
        if parent == 0 {
            return Ok(());
        }
        let sibling = self.get_sibling(obj)?;

        let first = self.get_child(parent)?;
        if first == obj {
            self.set_link(parent, ObjectLayout::child_offset, sibling)?;
        } else {
            let mut current = first;
            let mut guard = 0u32;
            while current != 0 {
                let next = self.get_sibling(current)?;
                if next == obj {
                    self.set_link(current, ObjectLayout::sibling_offset, sibling)?;
                    break;
                }
                current = next;
                guard += 1;
                if guard > 0xFFFF {
                    warn!("remove_obj: sibling chain of object {} loops", parent);
                    break;
                }
            }
        }

        self.set_link(obj, ObjectLayout::parent_offset, 0)?;
        self.set_link(obj, ObjectLayout::sibling_offset, 0)?;
        debug!("removed object {} from {}", obj, parent);
        Ok(())
    }

    fn insert_object(&mut self, obj: u16, dest: u16) -> VmResult<()> {
        if self.object_addr(obj, "insert_obj").is_none()
            || self.object_addr(dest, "insert_obj").is_none()
        {
            return Ok(());
        }
        self.remove_object(obj)?;
        let first = self.get_child(dest)?;
        self.set_link(obj, ObjectLayout::sibling_offset, first)?;
        self.set_link(obj, ObjectLayout::parent_offset, dest)?;
        self.set_link(dest, ObjectLayout::child_offset, obj)?;
        debug!("inserted object {} into {}", obj, dest);
        Ok(())
    }

    fn get_property(&self, obj: u16, prop: u16) -> VmResult<u16> {
        let layout = self.object_layout();
        if prop == 0 || prop as u32 > layout.default_properties {
            warn!("get_prop: property {} out of range", prop);
            return Ok(0);
        }
        let Some(obj_addr) = self.object_addr(obj, "get_prop") else {
            return Ok(0);
        };
        match self.find_property(obj_addr, prop)? {
            Some(entry) if entry.len == 1 => Ok(self.read_byte(entry.data_addr)? as u16),
            Some(entry) => {
                if entry.len > 2 {
                    warn!(
                        "get_prop: property {} of object {} has length {}",
                        prop, obj, entry.len
                    );
                }
                self.read_word(entry.data_addr)
            }
            None => self.read_word(layout.table_addr + 2 * (prop as u32 - 1)),
        }
    }

    fn get_property_addr(&self, obj: u16, prop: u16) -> VmResult<u16> {
        let Some(obj_addr) = self.object_addr(obj, "get_prop_addr") else {
            return Ok(0);
        };
        Ok(self
            .find_property(obj_addr, prop)?
            .map_or(0, |entry| entry.data_addr as u16))
    }

    fn get_property_len(&self, data_addr: u16) -> VmResult<u16> {
        if data_addr == 0 {
            return Ok(0);
        }
        let size_byte = self.read_byte(data_addr as u32 - 1)?;
        let len = if self.version() <= 3 {
            (size_byte >> 5) as u16 + 1
        } else if size_byte & 0x80 != 0 {
            match size_byte & 0x3F {
                0 => 64,
                len => len as u16,
            }
        } else if size_byte & 0x40 != 0 {
            2
        } else {
            1
        };
        Ok(len)
    }

    fn get_next_property(&self, obj: u16, prop: u16) -> VmResult<u16> {
        let Some(obj_addr) = self.object_addr(obj, "get_next_prop") else {
            return Ok(0);
        };
        if prop == 0 {
            let first = self.first_property_addr(obj_addr)?;
            return Ok(self.property_at(first)?.map_or(0, |entry| entry.number as u16));
        }
        match self.find_property(obj_addr, prop)? {
            Some(entry) => {
                let next = entry.data_addr + entry.len as u32;
                Ok(self.property_at(next)?.map_or(0, |entry| entry.number as u16))
            }
            None => {
                warn!("get_next_prop: object {} has no property {}", obj, prop);
                Ok(0)
            }
        }
    }

    fn put_property(&mut self, obj: u16, prop: u16, value: u16) -> VmResult<()> {
        let Some(obj_addr) = self.object_addr(obj, "put_prop") else {
            return Ok(());
        };
        match self.find_property(obj_addr, prop)? {
            Some(entry) if entry.len == 1 => self.write_byte(entry.data_addr, value as u8),
            Some(entry) => self.write_word(entry.data_addr, value),
            None => {
                warn!("put_prop: object {} has no property {}", obj, prop);
                Ok(())
            }
        }
    }

    fn short_name_addr(&self, obj: u16) -> VmResult<Option<u32>> {
        let Some(obj_addr) = self.object_addr(obj, "print_obj") else {
            return Ok(None);
        };
        let table = self.property_table_addr(obj_addr)?;
        if self.read_byte(table)? == 0 {
            return Ok(None);
        }
        Ok(Some(table + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;
    use crate::test_utils::{ObjectSpec, StoryBuilder};
    use crate::vm::DEFAULT_STACK_LIMIT;
    use test_log::test;

    /// 1 (room) contains 2 and 3; 4 is loose
    fn tree_vm(version: u8) -> VM {
        let story = StoryBuilder::new(version)
            .object(ObjectSpec::new(1).child(2).name("room"))
            .object(
                ObjectSpec::new(2)
                    .parent(1)
                    .sibling(3)
                    .attributes(&[0, 31])
                    .property(18, &[0x12, 0x34])
                    .property(5, &[0x07])
                    .property(3, &[1, 2, 3, 4]),
            )
            .object(ObjectSpec::new(3).parent(1))
            .object(ObjectSpec::new(4))
            .default_property(7, 0x0777)
            .build();
        VM::new(Memory::new(story), DEFAULT_STACK_LIMIT).unwrap()
    }

    #[test]
    fn test_tree_links() {
        for version in [3, 5] {
            let vm = tree_vm(version);
            assert_eq!(vm.get_parent(2).unwrap(), 1);
            assert_eq!(vm.get_child(1).unwrap(), 2);
            assert_eq!(vm.get_sibling(2).unwrap(), 3);
            assert_eq!(vm.get_sibling(3).unwrap(), 0);
        }
    }

    #[test]
    fn test_object_zero_is_tolerated() {
        let mut vm = tree_vm(3);
        assert_eq!(vm.get_parent(0).unwrap(), 0);
        assert_eq!(vm.get_child(0).unwrap(), 0);
        assert!(!vm.test_attribute(0, 1).unwrap());
        vm.set_attribute(0, 1, true).unwrap();
        vm.insert_object(0, 1).unwrap();
        vm.remove_object(0).unwrap();
        assert_eq!(vm.get_property(0, 5).unwrap(), 0);
        assert_eq!(vm.get_child(1).unwrap(), 2);
    }

    #[test]
    fn test_attributes() {
        for version in [3, 5] {
            let mut vm = tree_vm(version);
            assert!(vm.test_attribute(2, 0).unwrap());
            assert!(vm.test_attribute(2, 31).unwrap());
            assert!(!vm.test_attribute(2, 1).unwrap());
            vm.set_attribute(2, 1, true).unwrap();
            assert!(vm.test_attribute(2, 1).unwrap());
            vm.set_attribute(2, 0, false).unwrap();
            assert!(!vm.test_attribute(2, 0).unwrap());
        }
        // Attribute 40 only exists from version 4
        let mut vm = tree_vm(3);
        vm.set_attribute(2, 40, true).unwrap();
        assert!(!vm.test_attribute(2, 40).unwrap());
        let mut vm = tree_vm(5);
        vm.set_attribute(2, 40, true).unwrap();
        assert!(vm.test_attribute(2, 40).unwrap());
    }

    #[test]
    fn test_insert_and_remove() {
        let mut vm = tree_vm(3);
        vm.insert_object(4, 1).unwrap();
        assert_eq!(vm.get_child(1).unwrap(), 4);
        assert_eq!(vm.get_sibling(4).unwrap(), 2);
        assert_eq!(vm.get_parent(4).unwrap(), 1);

        // Removing a middle child relinks its elder sibling
        vm.remove_object(2).unwrap();
        assert_eq!(vm.get_sibling(4).unwrap(), 3);
        assert_eq!(vm.get_parent(2).unwrap(), 0);
        assert_eq!(vm.get_sibling(2).unwrap(), 0);

        // Moving an object between parents
        vm.insert_object(3, 2).unwrap();
        assert_eq!(vm.get_child(2).unwrap(), 3);
        assert_eq!(vm.get_sibling(4).unwrap(), 0);
    }

    #[test]
    fn test_properties() {
        for version in [3, 5] {
            let mut vm = tree_vm(version);
            assert_eq!(vm.get_property(2, 18).unwrap(), 0x1234);
            assert_eq!(vm.get_property(2, 5).unwrap(), 7);
            // Missing property falls back to the default table
            assert_eq!(vm.get_property(2, 7).unwrap(), 0x0777);

            let addr = vm.get_property_addr(2, 3).unwrap();
            assert_ne!(addr, 0);
            assert_eq!(vm.get_property_len(addr).unwrap(), 4);
            assert_eq!(vm.read_byte(addr as u32 + 3).unwrap(), 4);
            assert_eq!(vm.get_property_addr(2, 9).unwrap(), 0);
            assert_eq!(vm.get_property_len(0).unwrap(), 0);

            vm.put_property(2, 18, 0xBEEF).unwrap();
            assert_eq!(vm.get_property(2, 18).unwrap(), 0xBEEF);
            vm.put_property(2, 5, 0x1FF).unwrap();
            assert_eq!(vm.get_property(2, 5).unwrap(), 0xFF);
            vm.put_property(2, 9, 1).unwrap();
        }
    }

    #[test]
    fn test_next_property_walks_descending() {
        let vm = tree_vm(3);
        assert_eq!(vm.get_next_property(2, 0).unwrap(), 18);
        assert_eq!(vm.get_next_property(2, 18).unwrap(), 5);
        assert_eq!(vm.get_next_property(2, 5).unwrap(), 3);
        assert_eq!(vm.get_next_property(2, 3).unwrap(), 0);
        assert_eq!(vm.get_next_property(2, 4).unwrap(), 0);
        assert_eq!(vm.get_next_property(3, 0).unwrap(), 0);
    }

    #[test]
    fn test_short_name() {
        let vm = tree_vm(3);
        assert!(vm.short_name_addr(1).unwrap().is_some());
        assert_eq!(vm.short_name_addr(3).unwrap(), None);
    }
}

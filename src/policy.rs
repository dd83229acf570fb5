//! The learned policy: one action per valid state, shared across
//! workers the same way [`crate::value::ValueFunctions`] is.

use std::cell::UnsafeCell;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::error::Error;
use crate::geometry::Action;

struct SharedBuffer {
    data: Box<[UnsafeCell<u8>]>,
}

unsafe impl Sync for SharedBuffer {}

impl SharedBuffer {
    fn new(len: usize) -> Self {
        SharedBuffer {
            data: (0..len).map(|_| UnsafeCell::new(0)).collect(),
        }
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn get(&self, index: usize) -> u8 {
        unsafe { *self.data[index].get() }
    }

    fn set(&self, index: usize, value: u8) {
        unsafe {
            *self.data[index].get() = value;
        }
    }
}

/// One action per valid state, indexed by valid-state index.
#[derive(Clone)]
pub struct Policy {
    buffer: Arc<SharedBuffer>,
}

impl Policy {
    pub fn new(space_size: usize) -> Self {
        Policy {
            buffer: Arc::new(SharedBuffer::new(space_size)),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn get(&self, index: usize) -> Action {
        Action::from_index(self.buffer.get(index) as usize)
    }

    pub fn set(&self, index: usize, action: Action) {
        self.buffer.set(index, action.index() as u8);
    }

    /// Serialize as one raw byte per valid state, in valid-index order.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        for index in 0..self.len() {
            writer.write_all(&[self.buffer.get(index)])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>, space_size: usize) -> Result<Self, Error> {
        use std::io::Read;
        let file = File::open(path)?;
        let mut all = Vec::with_capacity(space_size);
        BufReader::new(file).read_to_end(&mut all)?;
        if all.len() != space_size {
            return Err(Error::Config(format!(
                "policy file has {} entries, expected {}",
                all.len(),
                space_size
            )));
        }
        let policy = Policy::new(space_size);
        for (index, byte) in all.into_iter().enumerate() {
            policy.buffer.set(index, byte);
        }
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let policy = Policy::new(4);
        policy.set(2, Action::Left);
        assert_eq!(policy.get(2), Action::Left);
        assert_eq!(policy.get(0), Action::Up);
    }
}

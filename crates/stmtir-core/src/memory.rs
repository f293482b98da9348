use crate::utils::ceil32;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    pub position: usize,
    pub size: usize,
}

impl FreeBlock {
    fn end(&self) -> usize {
        self.position + self.size
    }
}

/// First-fit allocator over the function's memory frame.
///
/// Freed blocks are merged with their neighbours; a free block touching the
/// top of the frame is given back to the frame.
#[derive(Debug, Clone)]
pub struct MemoryAllocator {
    start: usize,
    next_mem: usize,
    high_water: usize,
    free_list: Vec<FreeBlock>,
}

impl MemoryAllocator {
    pub fn new(start: usize) -> Self {
        Self {
            start,
            next_mem: start,
            high_water: start,
            free_list: Vec::new(),
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// Highest address ever handed out, plus one.
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Bytes currently in use.
    pub fn in_use(&self) -> usize {
        let free: usize = self.free_list.iter().map(|b| b.size).sum();
        self.next_mem - self.start - free
    }

    pub fn free_blocks(&self) -> &[FreeBlock] {
        &self.free_list
    }

    pub fn allocate(&mut self, size: usize) -> usize {
        let size = ceil32(size.max(1));

        if let Some(i) = self.free_list.iter().position(|b| b.size >= size) {
            let block = self.free_list[i];
            if block.size == size {
                self.free_list.remove(i);
            } else {
                self.free_list[i] = FreeBlock {
                    position: block.position + size,
                    size: block.size - size,
                };
            }
            trace!(position = block.position, size, "reused free block");
            return block.position;
        }

        let position = self.next_mem;
        self.next_mem += size;
        self.high_water = self.high_water.max(self.next_mem);
        trace!(position, size, "expanded memory frame");
        position
    }

    pub fn deallocate(&mut self, position: usize, size: usize) {
        let size = ceil32(size.max(1));
        let at = self
            .free_list
            .iter()
            .position(|b| b.position > position)
            .unwrap_or(self.free_list.len());
        self.free_list.insert(at, FreeBlock { position, size });
        self.merge_free_blocks();

        if let Some(last) = self.free_list.last().copied() {
            if last.end() == self.next_mem {
                self.next_mem = last.position;
                self.free_list.pop();
            }
        }
        trace!(position, size, "released memory");
    }

    fn merge_free_blocks(&mut self) {
        let mut merged: Vec<FreeBlock> = Vec::with_capacity(self.free_list.len());
        for block in self.free_list.drain(..) {
            match merged.last_mut() {
                Some(prev) if prev.end() == block.position => prev.size += block.size,
                _ => merged.push(block),
            }
        }
        self.free_list = merged;
    }
}

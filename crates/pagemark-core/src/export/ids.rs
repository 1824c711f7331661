use crate::export::coco::CocoDataset;

/// Next free ids for the three id spaces of a dataset.
///
/// One allocator belongs to one builder. Independent builders can run side
/// by side and be combined afterwards with [`CocoDataset::merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdAllocator {
    next_paper: usize,
    next_image: usize,
    next_annotation: usize,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue numbering after the records already in `dataset`.
    pub fn seeded_from(dataset: &CocoDataset) -> Self {
        IdAllocator {
            next_paper: dataset.papers.len(),
            next_image: dataset.images.len(),
            next_annotation: dataset.annotations.len(),
        }
    }

    pub fn paper(&mut self) -> usize {
        bump(&mut self.next_paper)
    }

    pub fn image(&mut self) -> usize {
        bump(&mut self.next_image)
    }

    pub fn annotation(&mut self) -> usize {
        bump(&mut self.next_annotation)
    }
}

fn bump(counter: &mut usize) -> usize {
    let id = *counter;
    *counter += 1;
    id
}

//! Chunking policy shared by both adapters.

/// Target number of elements per chunk of an extendable array.
pub(crate) const EXTENDABLE_CHUNK_ELEMENTS: usize = 1 << 16;

/// Chunk shape for an extendable array with the given tail shape. The tail
/// is kept whole and the leading axis takes as many rows as fit the target.
pub(crate) fn extendable_chunk(tail_shape: &[usize]) -> Vec<usize> {
    let row = tail_shape.iter().product::<usize>().max(1);
    let rows = (EXTENDABLE_CHUNK_ELEMENTS / row).max(1);
    std::iter::once(rows)
        .chain(tail_shape.iter().map(|&x| x.max(1)))
        .collect()
}

/// Chunk shape for a compressible array of fixed `shape`.
pub(crate) fn compressible_chunk(shape: &[usize]) -> Vec<usize> {
    if shape.len() == 1 {
        vec![shape[0].min(10000).max(1)]
    } else {
        shape.iter().map(|&x| x.min(100).max(1)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extendable_chunk() {
        assert_eq!(extendable_chunk(&[3]), vec![21845, 3]);
        assert_eq!(extendable_chunk(&[]), vec![65536]);
        assert_eq!(extendable_chunk(&[0, 4]), vec![65536, 1, 4]);
        assert_eq!(extendable_chunk(&[1 << 20]), vec![1, 1 << 20]);
    }

    #[test]
    fn test_compressible_chunk() {
        assert_eq!(compressible_chunk(&[50000]), vec![10000]);
        assert_eq!(compressible_chunk(&[0]), vec![1]);
        assert_eq!(compressible_chunk(&[250, 7, 0]), vec![100, 7, 1]);
        assert_eq!(compressible_chunk(&[]), Vec::<usize>::new());
    }
}

pub mod btree_index;
pub mod btree_iterator;
pub mod btree_page;
pub mod header_page;

pub use btree_index::BTreeIndex;
pub use btree_iterator::BTreeIterator;
pub use btree_page::{
    node_kind, InternalNode, InternalNodeRef, LeafNode, LeafNodeRef, NodeKind,
};
pub use header_page::{HeaderPage, HeaderPageRef, MAX_HEADER_RECORDS};

pub mod disjoint_set;
pub mod handle;
pub mod index_object;

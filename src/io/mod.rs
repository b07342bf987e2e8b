mod storage;

pub use storage::{
    read_u16_le, read_u32_le, read_u64_le, read_uint_le, FileAccess, FileStorage, MemoryStorage,
    Storage,
};

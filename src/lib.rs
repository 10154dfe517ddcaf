/// Use mimalloc as the global allocator for all binaries.
/// The engine allocates one owned text buffer per input line, and mimalloc's
/// thread-local caching handles that churn far better than glibc malloc.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod common;
pub mod datagen;
pub mod sort;

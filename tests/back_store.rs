mod common;

use tauon::*;

#[test]
fn test_store_file_contract() {
    common::init_logger();
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("store.img");

    let mut store = BackStore::create_file(&image, 128).unwrap();
    assert_eq!(store.num_blocks(), 128);
    assert_eq!(store.free_blocks(), 128 - BITMAP_BLOCKS);

    let first = store.allocate().unwrap();
    assert_eq!(first as usize, BITMAP_BLOCKS);
    assert!(store.request(100));
    assert!(!store.request(100));
    assert!(!store.request(0));
    assert!(!store.request(128));

    let mut block: Block = [0; BLOCK_SIZE];
    block[..5].copy_from_slice(b"hello");
    store.write(100, &block).unwrap();
    assert_eq!(store.write(3, &block), Err(Error::InvalidBlockId));
    store.release(first);
    store.release(first);
    store.close().unwrap();

    let store = BackStore::open_file(&image).unwrap();
    assert!(store.is_allocated(100));
    assert!(!store.is_allocated(first));
    let mut read: Block = [0; BLOCK_SIZE];
    store.read(100, &mut read).unwrap();
    assert_eq!(read, block);
    assert_eq!(store.read(first, &mut read), Err(Error::InvalidBlockId));
    log!("{} of {} blocks free", store.free_blocks(), store.num_blocks());
}

#[test]
fn test_store_exhaustion() {
    let mut store = BackStore::create(RamDisk::new(MIN_BLOCKS)).unwrap();
    let mut ids = Vec::new();
    while let Some(id) = store.allocate() {
        ids.push(id);
    }
    assert_eq!(ids.len(), MIN_BLOCKS - BITMAP_BLOCKS);
    assert_eq!(store.free_blocks(), 0);
    store.release(ids[10]);
    assert_eq!(store.allocate(), Some(ids[10]));
}

#[test]
fn test_store_open_missing() {
    let dir = tempfile::tempdir().unwrap();
    assert!(BackStore::open_file(dir.path().join("none.img")).is_err());
    assert!(matches!(BackStore::open_file(""), Err(Error::InvalidArgument)));
}

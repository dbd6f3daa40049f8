mod common;

use common::ram_fs;
use tauon::*;

#[test]
fn test_move_file() {
    let mut fs = ram_fs(1024);
    fs.create("/a", FileType::Regular).unwrap();
    fs.create("/d", FileType::Directory).unwrap();
    let id = fs.lookup("/a").unwrap();
    let fd = fs.open("/a").unwrap();
    fs.write(fd, b"moving data").unwrap();

    fs.move_file("/a", "/d/b").unwrap();
    assert_eq!(fs.lookup("/a"), Err(Error::NotFound));
    assert_eq!(fs.lookup("/d/b"), Ok(id));
    let stat = fs.stat("/d/b").unwrap();
    assert_eq!(stat.name, "b");
    assert_eq!(stat.parent, fs.lookup("/d").unwrap());

    // the open descriptor follows the file
    fs.write(fd, b"!").unwrap();
    fs.seek(fd, 0, Whence::Set).unwrap();
    let mut buf = [0u8; 32];
    let n = fs.read(fd, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"moving data!");
}

#[test]
fn test_move_directory() {
    let mut fs = ram_fs(1024);
    fs.create("/d", FileType::Directory).unwrap();
    fs.create("/d/f", FileType::Regular).unwrap();
    fs.create("/e", FileType::Directory).unwrap();

    fs.move_file("/d", "/e/d").unwrap();
    assert!(fs.lookup("/e/d/f").is_ok());
    assert_eq!(fs.lookup("/d/f"), Err(Error::NotFound));
    let names: Vec<String> = fs.get_dir("/").unwrap().into_iter().map(|s| s.name).collect();
    assert_eq!(names, ["e"]);

    let device = fs.unmount().unwrap();
    let fs = FileSystem::mount(device).unwrap();
    assert!(fs.lookup("/e/d/f").is_ok());
    assert_eq!(fs.stat("/e/d").unwrap().parent, fs.lookup("/e").unwrap());
}

#[test]
fn test_rename_in_full_directory() {
    let mut fs = ram_fs(1024);
    fs.create("/d", FileType::Directory).unwrap();
    for i in 0..DIR_ENTRIES_PER_BLOCK {
        fs.create(&format!("/d/f{i}"), FileType::Regular).unwrap();
    }
    fs.move_file("/d/f0", "/d/renamed").unwrap();
    assert!(fs.lookup("/d/renamed").is_ok());
    assert_eq!(fs.lookup("/d/f0"), Err(Error::NotFound));
    assert_eq!(fs.get_dir("/d").unwrap().len(), DIR_ENTRIES_PER_BLOCK);
}

#[test]
fn test_move_into_full_directory() {
    let mut fs = ram_fs(1024);
    fs.create("/d", FileType::Directory).unwrap();
    for i in 0..DIR_ENTRIES_PER_BLOCK {
        fs.create(&format!("/d/f{i}"), FileType::Regular).unwrap();
    }
    fs.create("/a", FileType::Regular).unwrap();
    assert_eq!(fs.move_file("/a", "/d/a"), Err(Error::DirectoryFull));
    assert!(fs.lookup("/a").is_ok());
    assert_eq!(fs.lookup("/d/a"), Err(Error::NotFound));
}

#[test]
fn test_move_errors() {
    let mut fs = ram_fs(1024);
    fs.create("/a", FileType::Regular).unwrap();
    fs.create("/b", FileType::Regular).unwrap();
    fs.create("/d", FileType::Directory).unwrap();
    fs.create("/d/sub", FileType::Directory).unwrap();

    assert_eq!(fs.move_file("/a", "/b"), Err(Error::AlreadyExists));
    assert_eq!(fs.move_file("/a", "/a"), Err(Error::AlreadyExists));
    assert_eq!(fs.move_file("/nope", "/c"), Err(Error::NotFound));
    assert_eq!(fs.move_file("/a", "/nope/a"), Err(Error::NotFound));
    assert_eq!(fs.move_file("/a", "/b/a"), Err(Error::NotADirectory));
    assert_eq!(fs.move_file("/", "/x"), Err(Error::RootProtected));
    assert_eq!(fs.move_file("/a", "/"), Err(Error::RootProtected));
    assert_eq!(fs.move_file("/a", "relative"), Err(Error::InvalidPath));

    assert_eq!(fs.move_file("/d", "/d/x"), Err(Error::InvalidArgument));
    assert_eq!(fs.move_file("/d", "/d/sub/x"), Err(Error::InvalidArgument));
    assert!(fs.lookup("/d/sub").is_ok());
    assert!(fs.lookup("/a").is_ok());
}

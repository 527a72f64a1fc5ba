use super::*;
use tempfile::TempDir;

fn allowed() -> Vec<String> {
    vec![".txt".to_string(), ".md".to_string(), ".pdf".to_string()]
}

fn setup() -> (TempDir, DocumentLibrary) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let library = DocumentLibrary::new(temp_dir.path().join("uploads"), &allowed(), 1024);
    (temp_dir, library)
}

fn source_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let sources = dir.path().join("sources");
    fs::create_dir_all(&sources).expect("should create sources dir");
    let path = sources.join(name);
    fs::write(&path, content).expect("should write source file");
    path
}

#[test]
fn import_copies_into_library() {
    let (temp_dir, library) = setup();
    let source = source_file(&temp_dir, "notes.txt", "hello");

    let stored = library.import_file(&source).expect("should import");

    assert_eq!(stored, library.dir().join("notes.txt"));
    assert_eq!(fs::read_to_string(&stored).expect("should read"), "hello");
    assert!(source.exists(), "source is copied, not moved");
}

#[test]
fn import_renames_on_collision() {
    let (temp_dir, library) = setup();
    let source = source_file(&temp_dir, "notes.txt", "first");
    let first = library.import_file(&source).expect("should import");

    fs::write(&source, "second").expect("should rewrite source");
    let second = library.import_file(&source).expect("should import again");

    assert_ne!(first, second);
    let name = second
        .file_name()
        .expect("should have name")
        .to_string_lossy()
        .into_owned();
    assert!(name.starts_with("notes_"), "unexpected name {}", name);
    assert!(name.ends_with(".txt"));
    assert_eq!(fs::read_to_string(&first).expect("should read"), "first");
    assert_eq!(fs::read_to_string(&second).expect("should read"), "second");
}

#[test]
fn import_rejects_disallowed_extension() {
    let (temp_dir, library) = setup();
    let source = source_file(&temp_dir, "archive.zip", "zip");

    assert!(matches!(
        library.import_file(&source),
        Err(LibraryError::DisallowedExtension(ext)) if ext == ".zip"
    ));
}

#[test]
fn extension_check_is_case_insensitive() {
    let (temp_dir, library) = setup();
    let source = source_file(&temp_dir, "SHOUT.TXT", "loud");

    assert!(library.import_file(&source).is_ok());
}

#[test]
fn import_rejects_oversized_files() {
    let (temp_dir, library) = setup();
    let source = source_file(&temp_dir, "big.txt", &"x".repeat(2048));

    assert!(matches!(
        library.import_file(&source),
        Err(LibraryError::TooLarge {
            size_bytes: 2048,
            limit_bytes: 1024
        })
    ));
}

#[test]
fn file_inside_library_is_used_in_place() {
    let (_temp_dir, library) = setup();
    library.ensure_dir().expect("should create library dir");
    let inside = library.dir().join("already.txt");
    fs::write(&inside, "here").expect("should write file");

    let stored = library.import_file(&inside).expect("should import");

    assert_eq!(stored, inside);
    assert_eq!(library.list_files().expect("should list").len(), 1);
}

#[test]
fn file_inside_library_gets_the_listed_path() {
    let (_temp_dir, library) = setup();
    library.ensure_dir().expect("should create library dir");
    fs::write(library.dir().join("already.txt"), "here").expect("should write file");
    let roundabout = library
        .dir()
        .join("..")
        .join("uploads")
        .join("already.txt");

    let stored = library.import_file(&roundabout).expect("should import");

    assert_eq!(stored, library.dir().join("already.txt"));
    assert_eq!(
        library.list_files().expect("should list"),
        vec![stored.clone()]
    );
    assert_eq!(
        crate::index::document_id(&stored),
        crate::index::document_id(&library.list_files().expect("should list")[0])
    );
}

#[test]
fn imported_names_are_sanitized() {
    let (temp_dir, library) = setup();
    let source = source_file(&temp_dir, "my report (v2).txt", "text");

    let stored = library.import_file(&source).expect("should import");

    assert_eq!(
        stored.file_name().and_then(|n| n.to_str()),
        Some("my_report__v2_.txt")
    );
}

#[test]
fn list_files_is_sorted_and_filtered() {
    let (_temp_dir, library) = setup();
    library.ensure_dir().expect("should create library dir");
    for name in ["b.txt", "a.md", "skip.zip", "c.pdf"] {
        fs::write(library.dir().join(name), "x").expect("should write file");
    }
    fs::create_dir(library.dir().join("nested.txt")).expect("should create dir");

    let files = library.list_files().expect("should list");
    let names: Vec<&str> = files
        .iter()
        .filter_map(|path| path.file_name().and_then(|n| n.to_str()))
        .collect();

    assert_eq!(names, vec!["a.md", "b.txt", "c.pdf"]);
}

#[test]
fn list_files_of_missing_dir_is_empty() {
    let (_temp_dir, library) = setup();

    assert!(library.list_files().expect("should list").is_empty());
}

#[test]
fn delete_file_reports_presence() {
    let (_temp_dir, library) = setup();
    library.ensure_dir().expect("should create library dir");
    fs::write(library.dir().join("gone.txt"), "x").expect("should write file");

    assert!(library.delete_file("gone.txt").expect("should delete"));
    assert!(!library.delete_file("gone.txt").expect("second delete is a no-op"));
}

#[test]
fn delete_file_rejects_paths() {
    let (_temp_dir, library) = setup();

    assert!(matches!(
        library.delete_file("../escape.txt"),
        Err(LibraryError::InvalidName(_))
    ));
}

#[test]
fn sanitize_strips_separators_and_leading_dots() {
    assert_eq!(sanitize_filename("../../etc/passwd"), "_.._etc_passwd");
    assert_eq!(sanitize_filename(".hidden.txt"), "hidden.txt");
    assert_eq!(sanitize_filename("budget-2024_final.md"), "budget-2024_final.md");
}

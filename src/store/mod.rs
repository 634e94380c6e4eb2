//! Comment store
//!
//! One directory per post under the comments root, one file per comment
//! inside it, named by the decimal comment id. A file literally named
//! `closed` marks the post read-only. The filesystem is the only state:
//! every call re-reads the directory.

mod comment;
mod error;
pub mod natural;

pub use comment::{gravatar, Comment, HashAlgorithm, NewComment, Tombstone};
pub use error::{StoreError, StoreResult};

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Sentinel file that closes a post for new comments
pub const CLOSED_SENTINEL: &str = "closed";

/// Reduce a client-supplied name to a single safe path component
///
/// Backslashes count as separators, only the last component is kept,
/// and `.`/`..` collapse to the empty string.
pub fn sanitize(name: &str) -> String {
    let normalized = name.replace('\\', "/");
    let base = normalized
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    if base == "." || base == ".." {
        String::new()
    } else {
        base.to_string()
    }
}

/// A post resolved against the comments root
#[derive(Debug, Clone)]
pub struct Post {
    name: String,
    dir: PathBuf,
}

impl Post {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The post directory exists
    pub fn is_enabled(&self) -> bool {
        !self.name.is_empty() && self.dir.is_dir()
    }

    /// Enabled and not closed by the sentinel file
    pub fn is_open(&self) -> bool {
        self.is_enabled() && !self.dir.join(CLOSED_SENTINEL).exists()
    }

    fn comment_path(&self, id: u64) -> PathBuf {
        self.dir.join(id.to_string())
    }
}

/// Result of listing a post
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub post: String,
    pub open: bool,
    pub comments: Vec<Comment>,
}

/// Filesystem-backed comment store
#[derive(Debug, Clone)]
pub struct CommentStore {
    root: PathBuf,
    algorithm: HashAlgorithm,
}

impl CommentStore {
    pub fn new(root: impl Into<PathBuf>, algorithm: HashAlgorithm) -> Self {
        Self {
            root: root.into(),
            algorithm,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub const fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Resolve a post by (sanitized) name
    pub fn post(&self, name: &str) -> Post {
        let name = sanitize(name);
        let dir = self.root.join(&name);
        Post { name, dir }
    }

    /// All readable comments of a post in natural filename order
    ///
    /// Files that do not parse are left out; only [`Self::get`] reveals them.
    pub fn list(&self, post_name: &str) -> StoreResult<Listing> {
        let post = self.post(post_name);
        if !post.is_enabled() {
            return Err(StoreError::PostDisabled);
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(post.dir())? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        natural::sort_natural(&mut names);

        let comments = names
            .iter()
            .filter_map(|name| parse_id(name))
            .filter_map(|id| self.load(&post, id).ok().and_then(Result::ok))
            .collect();

        Ok(Listing {
            open: post.is_open(),
            post: post.name,
            comments,
        })
    }

    /// Fetch a single comment
    ///
    /// A present but unparseable file is reported as
    /// [`StoreError::Tombstoned`] with the status embedded in its content.
    pub fn get(&self, post_name: &str, id: &str) -> StoreResult<Comment> {
        let post = self.post(post_name);
        if !post.is_enabled() {
            return Err(StoreError::PostDisabled);
        }
        let id = parse_id(&sanitize(id)).ok_or(StoreError::CommentNotFound)?;
        match self.load(&post, id)? {
            Ok(comment) => Ok(comment),
            Err(tombstone) => Err(StoreError::Tombstoned {
                status: tombstone.status(),
                message: tombstone.message(),
            }),
        }
    }

    /// Validate a submission and build the record that will be saved
    ///
    /// Nothing is written; the id is assigned by [`Self::insert`].
    pub fn draft(&self, post_name: &str, submission: &NewComment) -> StoreResult<Comment> {
        let post = self.post(post_name);
        ensure_accepting(&post)?;
        if submission.body.trim().is_empty() {
            return Err(StoreError::EmptyBody);
        }

        Ok(Comment {
            id: 0,
            post: post.name,
            hash: None,
            time: Utc::now().timestamp().to_string(),
            author: submission.author.clone(),
            gravatar: gravatar(&submission.email),
            website: submission.website.clone(),
            body: submission.body.clone(),
            extra: BTreeMap::new(),
            missing: Vec::new(),
        })
    }

    /// Persist a drafted comment under a freshly allocated id
    pub fn insert(&self, post_name: &str, comment: Comment) -> StoreResult<Comment> {
        self.insert_with(post_name, comment, create_exclusive)
    }

    fn insert_with<F>(&self, post_name: &str, mut comment: Comment, open: F) -> StoreResult<Comment>
    where
        F: FnMut(&Path) -> io::Result<File>,
    {
        let post = self.post(post_name);
        ensure_accepting(&post)?;

        comment.post.clone_from(&post.name);
        comment.rehash(self.algorithm);

        let (id, mut file) = allocate(&post, open)?;
        comment.id = id;

        let path = post.comment_path(id);
        if let Err(e) = write_record(&mut file, &comment) {
            drop(file);
            tracing::error!(post = %post.name, id, error = %e, "failed to write comment");
            if let Err(cleanup) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %cleanup, "failed to remove partial comment file");
            }
            return Err(StoreError::Save(e));
        }

        tracing::info!(post = %post.name, id, "comment saved");
        Ok(comment)
    }

    /// Create a comment in one step
    pub fn create(&self, post_name: &str, submission: &NewComment) -> StoreResult<Comment> {
        let draft = self.draft(post_name, submission)?;
        self.insert(post_name, draft)
    }

    /// Read and parse one comment file
    ///
    /// The outer error is for a missing file; the inner one separates valid
    /// records from tombstones.
    fn load(&self, post: &Post, id: u64) -> StoreResult<Result<Comment, Tombstone>> {
        let path = post.comment_path(id);
        if !path.is_file() {
            return Err(StoreError::CommentNotFound);
        }
        let content = match fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::CommentNotFound),
            Err(e) => return Err(StoreError::Io(e)),
        };
        Ok(Comment::from_stored(&content, id, &post.name))
    }
}

/// Largest numeric prefix among the post's filenames, 0 when there is none
pub fn greatest_comment_id(dir: &Path) -> io::Result<u64> {
    let mut greatest = 0;
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        let digits: String = name.chars().take_while(char::is_ascii_digit).collect();
        if let Ok(id) = digits.parse::<u64>() {
            greatest = greatest.max(id);
        }
    }
    Ok(greatest)
}

fn ensure_accepting(post: &Post) -> StoreResult<()> {
    if !post.is_enabled() {
        return Err(StoreError::PostDisabled);
    }
    if !post.is_open() {
        return Err(StoreError::PostClosed);
    }
    Ok(())
}

// Exclusive create is the only synchronization between writers: losing a
// race means the file exists, so move on to the next id. Any other error
// aborts instead of looping.
fn allocate<F>(post: &Post, mut open: F) -> StoreResult<(u64, File)>
where
    F: FnMut(&Path) -> io::Result<File>,
{
    let mut id = greatest_comment_id(post.dir()).map_err(StoreError::Save)? + 1;
    loop {
        match open(&post.comment_path(id)) {
            Ok(file) => return Ok((id, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(post = %post.name, id, "comment id taken, retrying");
                id += 1;
            }
            Err(e) => return Err(StoreError::Save(e)),
        }
    }
}

fn create_exclusive(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

fn write_record(file: &mut File, comment: &Comment) -> io::Result<()> {
    let json = serde_json::to_string_pretty(comment).map_err(io::Error::other)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()
}

/// Comment ids are canonical decimal filenames
///
/// A leading zero (`01`) would name a different file than the id renders
/// back to, so such names are not comments.
fn parse_id(name: &str) -> Option<u64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if name.len() > 1 && name.starts_with('0') {
        return None;
    }
    name.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_store() -> (TempDir, CommentStore) {
        let temp_dir = TempDir::new().expect("Failed to create temporary directory");
        let store = CommentStore::new(temp_dir.path(), HashAlgorithm::Sha1);
        (temp_dir, store)
    }

    fn open_post(store: &CommentStore, name: &str) {
        fs::create_dir(store.root().join(name)).unwrap();
    }

    fn submission(body: &str) -> NewComment {
        NewComment {
            author: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            website: String::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("post"), "post");
        assert_eq!(sanitize("../../etc/passwd"), "passwd");
        assert_eq!(sanitize("..\\..\\secret"), "secret");
        assert_eq!(sanitize(".."), "");
        assert_eq!(sanitize("."), "");
        assert_eq!(sanitize("a/b/"), "b");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn test_post_flags() {
        let (_tmp, store) = setup_store();
        assert!(!store.post("missing").is_enabled());
        assert!(!store.post("..").is_enabled());

        open_post(&store, "p1");
        let post = store.post("p1");
        assert!(post.is_enabled());
        assert!(post.is_open());

        File::create(post.dir().join(CLOSED_SENTINEL)).unwrap();
        assert!(post.is_enabled());
        assert!(!post.is_open());
    }

    #[test]
    fn test_create_first_comment() {
        let (_tmp, store) = setup_store();
        open_post(&store, "p1");

        let comment = store.create("p1", &submission("Hello")).unwrap();
        assert_eq!(comment.id, 1);
        assert_eq!(comment.post, "p1");
        assert!(comment.verify_hash());
        assert!(store.root().join("p1").join("1").is_file());
    }

    #[test]
    fn test_allocation_skips_past_greatest_id() {
        let (_tmp, store) = setup_store();
        open_post(&store, "p1");
        let dir = store.root().join("p1");
        fs::write(dir.join("3"), "{}").unwrap();
        fs::write(dir.join("17-draft"), "").unwrap();

        let comment = store.create("p1", &submission("Hello")).unwrap();
        assert_eq!(comment.id, 18);
    }

    #[test]
    fn test_allocation_retries_when_id_taken() {
        let (_tmp, store) = setup_store();
        open_post(&store, "p1");
        let post = store.post("p1");

        let (first, _file) = allocate(&post, create_exclusive).unwrap();
        let (second, _file) = allocate(&post, create_exclusive).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn test_allocation_aborts_on_other_errors() {
        let (_tmp, store) = setup_store();
        open_post(&store, "p1");
        let post = store.post("p1");

        let mut attempts = Vec::new();
        let result = allocate(&post, |path| {
            attempts.push(path.file_name().unwrap().to_string_lossy().into_owned());
            if attempts.len() < 3 {
                Err(io::Error::from(ErrorKind::AlreadyExists))
            } else {
                Err(io::Error::from(ErrorKind::PermissionDenied))
            }
        });

        assert_eq!(attempts, ["1", "2", "3"]);
        let err = result.unwrap_err();
        assert!(matches!(&err, StoreError::Save(e) if e.kind() == ErrorKind::PermissionDenied));
        assert_eq!(err.status(), 500);
        assert_eq!(err.public_message(), "There was a problem saving your comment.");
    }

    #[test]
    fn test_insert_into_vanished_post_dir_is_save_error() {
        let (_tmp, store) = setup_store();
        open_post(&store, "p1");
        let draft = store.draft("p1", &submission("Hello")).unwrap();
        let dir = store.root().join("p1");

        let result = store.insert_with("p1", draft, |path| {
            // The post directory disappears between the checks and the write
            fs::remove_dir(&dir)?;
            fs::write(&dir, "")?;
            create_exclusive(path)
        });

        assert!(matches!(result, Err(StoreError::Save(_))));
        assert!(dir.is_file());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_write_removes_orphan() {
        let (_tmp, store) = setup_store();
        open_post(&store, "p1");
        let draft = store.draft("p1", &submission("Hello")).unwrap();

        // The id file is created, but the record goes to a full device
        let result = store.insert_with("p1", draft, |path| {
            create_exclusive(path)?;
            OpenOptions::new().write(true).open("/dev/full")
        });

        let err = result.unwrap_err();
        assert!(matches!(err, StoreError::Save(_)));
        assert_eq!(err.status(), 500);
        assert_eq!(err.public_message(), "There was a problem saving your comment.");
        assert_eq!(fs::read_dir(store.root().join("p1")).unwrap().count(), 0);

        let comment = store.create("p1", &submission("Again")).unwrap();
        assert_eq!(comment.id, 1);
    }

    #[test]
    fn test_create_rejections_write_nothing() {
        let (_tmp, store) = setup_store();
        assert!(matches!(
            store.create("nope", &submission("Hello")),
            Err(StoreError::PostDisabled)
        ));

        open_post(&store, "p1");
        assert!(matches!(
            store.create("p1", &submission("   ")),
            Err(StoreError::EmptyBody)
        ));

        File::create(store.root().join("p1").join(CLOSED_SENTINEL)).unwrap();
        assert!(matches!(
            store.create("p1", &submission("Hello")),
            Err(StoreError::PostClosed)
        ));
        let entries = fs::read_dir(store.root().join("p1")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_list_natural_order_and_skips_unreadable() {
        let (_tmp, store) = setup_store();
        open_post(&store, "p1");
        let dir = store.root().join("p1");
        for id in ["10", "2", "9"] {
            fs::write(dir.join(id), format!(r#"{{"body": "comment {id}"}}"#)).unwrap();
        }
        fs::write(dir.join("4"), "410 removed").unwrap();
        fs::write(dir.join(".hidden"), "{}").unwrap();
        fs::write(dir.join("notes.txt"), "{}").unwrap();

        let listing = store.list("p1").unwrap();
        let ids: Vec<u64> = listing.comments.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 9, 10]);
        assert!(listing.open);
        assert_eq!(listing.post, "p1");
    }

    #[test]
    fn test_list_disabled_post() {
        let (_tmp, store) = setup_store();
        assert!(matches!(store.list("ghost"), Err(StoreError::PostDisabled)));
    }

    #[test]
    fn test_get_variants() {
        let (_tmp, store) = setup_store();
        open_post(&store, "p1");
        let dir = store.root().join("p1");
        fs::write(dir.join("1"), r#"{"id": 99, "post": "forged", "body": "hi"}"#).unwrap();
        fs::write(dir.join("2"), "410 removed").unwrap();
        fs::write(dir.join("3"), "").unwrap();

        let comment = store.get("p1", "1").unwrap();
        assert_eq!(comment.id, 1);
        assert_eq!(comment.post, "p1");

        match store.get("p1", "2") {
            Err(StoreError::Tombstoned { status, message }) => {
                assert_eq!(status, 410);
                assert_eq!(message, "removed");
            }
            other => panic!("expected tombstone, got {other:?}"),
        }
        match store.get("p1", "3") {
            Err(StoreError::Tombstoned { status, message }) => {
                assert_eq!(status, 410);
                assert_eq!(message, "This comment has been removed.");
            }
            other => panic!("expected tombstone, got {other:?}"),
        }
        assert!(matches!(store.get("p1", "4"), Err(StoreError::CommentNotFound)));
        assert!(matches!(store.get("p1", "closed"), Err(StoreError::CommentNotFound)));
    }

    #[test]
    fn test_leading_zero_names_are_not_comments() {
        let (_tmp, store) = setup_store();
        open_post(&store, "p1");
        let dir = store.root().join("p1");
        fs::write(dir.join("1"), r#"{"body": "one"}"#).unwrap();
        fs::write(dir.join("01"), r#"{"body": "zero one"}"#).unwrap();

        let listing = store.list("p1").unwrap();
        let bodies: Vec<_> = listing.comments.iter().map(|c| c.body.as_str()).collect();
        assert_eq!(bodies, ["one"]);
        assert!(matches!(store.get("p1", "01"), Err(StoreError::CommentNotFound)));
        assert_eq!(store.get("p1", "1").unwrap().body, "one");
    }

    #[test]
    fn test_get_traversal_stays_inside_post() {
        let (tmp, store) = setup_store();
        open_post(&store, "p1");
        fs::write(tmp.path().join("5"), r#"{"body": "outside"}"#).unwrap();
        fs::write(store.root().join("p1").join("5"), r#"{"body": "inside"}"#).unwrap();

        let comment = store.get("p1", "../5").unwrap();
        assert_eq!(comment.body, "inside");
        assert!(matches!(store.get("../p1", "..\\5"), Ok(c) if c.body == "inside"));
    }

    #[test]
    fn test_greatest_comment_id() {
        let (_tmp, store) = setup_store();
        open_post(&store, "p1");
        let dir = store.root().join("p1");
        assert_eq!(greatest_comment_id(&dir).unwrap(), 0);
        fs::write(dir.join("9"), "").unwrap();
        fs::write(dir.join("10"), "").unwrap();
        fs::write(dir.join(CLOSED_SENTINEL), "").unwrap();
        assert_eq!(greatest_comment_id(&dir).unwrap(), 10);
    }
}

use std::sync::Arc;

use relic_types::{ObjectId, ObjectKind};

use crate::error::{StoreError, StoreResult};
use crate::object::{read_kv, KvError};
use crate::repository::RepoShared;
use crate::signature::Signature;
use crate::sparse::SparseObject;

/// A snapshot of the tree together with its ancestry.
///
/// The serialized layout is strictly ordered key-value lines followed by a
/// blank line and the message bytes:
///
/// ```text
/// tree <hex>
/// parent <hex>        (zero or more)
/// author <signature>
/// committer <signature>
///
/// <message>
/// ```
#[derive(Debug)]
pub struct Commit {
    pub(crate) id: ObjectId,
    tree: SparseObject,
    parents: Vec<SparseObject>,
    author: Signature,
    committer: Signature,
    message: Vec<u8>,
}

impl Commit {
    /// Assemble a new, unwritten commit.
    pub fn new(
        tree: SparseObject,
        parents: Vec<SparseObject>,
        author: Signature,
        committer: Signature,
        message: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: ObjectId::null(),
            tree,
            parents,
            author,
            committer,
            message: message.into(),
        }
    }

    pub(crate) fn parse(id: ObjectId, data: &[u8], repo: &Arc<RepoShared>) -> StoreResult<Self> {
        let malformed = |reason: String| StoreError::MalformedObject {
            kind: ObjectKind::Commit,
            reason,
        };

        let (value, mut rest) = read_kv(data, b"tree ")
            .map_err(|_| malformed("missing tree line".into()))?;
        let tree = SparseObject::new(parse_id(value).map_err(&malformed)?, repo);

        let mut parents = Vec::new();
        loop {
            match read_kv(rest, b"parent ") {
                Ok((value, after)) => {
                    parents.push(SparseObject::new(parse_id(value).map_err(&malformed)?, repo));
                    rest = after;
                }
                Err(KvError::PrefixMismatch) => break,
                Err(KvError::MissingNewline) => {
                    return Err(malformed("unterminated parent line".into()))
                }
            }
        }

        let (value, rest) =
            read_kv(rest, b"author ").map_err(|_| malformed("missing author line".into()))?;
        let author = Signature::parse(value).map_err(&malformed)?;

        let (value, rest) =
            read_kv(rest, b"committer ").map_err(|_| malformed("missing committer line".into()))?;
        let committer = Signature::parse(value).map_err(&malformed)?;

        let message = match rest.first() {
            Some(b'\n') => rest[1..].to_vec(),
            _ => return Err(malformed("missing blank line before message".into())),
        };

        Ok(Self {
            id,
            tree,
            parents,
            author,
            committer,
            message,
        })
    }

    pub fn serialize(&self) -> StoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"tree ");
        buf.extend_from_slice(require_id(&self.tree, "tree")?.to_hex().as_bytes());
        buf.push(b'\n');
        for parent in &self.parents {
            buf.extend_from_slice(b"parent ");
            buf.extend_from_slice(require_id(parent, "parent")?.to_hex().as_bytes());
            buf.push(b'\n');
        }
        buf.extend_from_slice(format!("author {}\n", self.author).as_bytes());
        buf.extend_from_slice(format!("committer {}\n", self.committer).as_bytes());
        buf.push(b'\n');
        buf.extend_from_slice(&self.message);
        Ok(buf)
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The root tree of this commit.
    pub fn tree(&self) -> &SparseObject {
        &self.tree
    }

    /// Parent commits, eldest-first as serialized.
    pub fn parents(&self) -> &[SparseObject] {
        &self.parents
    }

    pub fn author(&self) -> &Signature {
        &self.author
    }

    pub fn committer(&self) -> &Signature {
        &self.committer
    }

    /// The raw message bytes, including any trailing newline.
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// Whether this commit has no parents.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Whether this commit has more than one parent.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.tree.id() == other.tree.id()
            && self.parents.len() == other.parents.len()
            && self
                .parents
                .iter()
                .zip(&other.parents)
                .all(|(a, b)| a.id() == b.id())
            && self.author == other.author
            && self.committer == other.committer
            && self.message == other.message
    }
}

impl Eq for Commit {}

pub(crate) fn parse_id(value: &[u8]) -> Result<ObjectId, String> {
    let hex = std::str::from_utf8(value).map_err(|_| "id is not UTF-8 hex".to_string())?;
    ObjectId::from_hex(hex).map_err(|e| e.to_string())
}

fn require_id(sparse: &SparseObject, what: &str) -> StoreResult<ObjectId> {
    let id = sparse.id();
    if id.is_null() {
        return Err(StoreError::UnwrittenChild {
            name: what.to_string(),
        });
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use crate::Repository;

    use super::*;

    const SAMPLE: &[u8] = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
        parent ce013625030ba8dba906f756967f9e9ca394464a\n\
        parent e69de29bb2d1d6434b8b29ae775ad8c2e48c5391\n\
        author A U Thor <author@example.com> 1700000000 +0900\n\
        committer C O Mitter <committer@example.com> 1700000001 -0500\n\
        \nMerge the things.\n\nSecond paragraph.\n";

    fn repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn parse_reads_every_section() {
        let (_dir, repo) = repo();
        let commit = Commit::parse(ObjectId::from_raw([1; 20]), SAMPLE, repo.shared()).unwrap();
        assert_eq!(
            commit.tree().id().to_hex(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
        assert_eq!(commit.parents().len(), 2);
        assert!(commit.is_merge());
        assert_eq!(commit.author().name, "A U Thor");
        assert_eq!(commit.author().offset_minutes, 540);
        assert_eq!(commit.committer().email, "committer@example.com");
        assert_eq!(
            commit.message(),
            &b"Merge the things.\n\nSecond paragraph.\n"[..]
        );
    }

    #[test]
    fn serialize_reproduces_input_bytes() {
        let (_dir, repo) = repo();
        let commit = Commit::parse(ObjectId::from_raw([1; 20]), SAMPLE, repo.shared()).unwrap();
        assert_eq!(commit.serialize().unwrap(), SAMPLE);
    }

    #[test]
    fn parse_rejects_out_of_order_keys() {
        let (_dir, repo) = repo();
        let bad = b"author A U Thor <a@b> 1 +0000\n\
            tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\n";
        let err = Commit::parse(ObjectId::null(), bad, repo.shared()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::MalformedObject {
                kind: ObjectKind::Commit,
                ..
            }
        ));
    }

    #[test]
    fn parse_rejects_bad_parent_hex() {
        let (_dir, repo) = repo();
        let bad = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
            parent nothex\n\
            author A <a@b> 1 +0000\n\
            committer A <a@b> 1 +0000\n\n";
        assert!(Commit::parse(ObjectId::null(), bad, repo.shared()).is_err());
    }

    #[test]
    fn empty_message_round_trips() {
        let (_dir, repo) = repo();
        let minimal = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
            author A <a@b> 1 +0000\n\
            committer A <a@b> 1 +0000\n\n";
        let commit = Commit::parse(ObjectId::null(), minimal, repo.shared()).unwrap();
        assert!(commit.is_root());
        assert!(commit.message().is_empty());
        assert_eq!(commit.serialize().unwrap(), minimal);
    }
}

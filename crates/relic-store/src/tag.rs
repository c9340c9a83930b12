use std::sync::Arc;

use relic_types::{ObjectId, ObjectKind};

use crate::commit::parse_id;
use crate::error::{StoreError, StoreResult};
use crate::object::read_kv;
use crate::repository::RepoShared;
use crate::signature::Signature;
use crate::sparse::SparseObject;

/// An annotated tag: a named, signed-off pointer at another object.
///
/// Layout: `object <hex>`, `type <kind>`, `tag <name>`, `tagger
/// <signature>`, a blank line, then the message bytes.
#[derive(Debug)]
pub struct Tag {
    pub(crate) id: ObjectId,
    target: SparseObject,
    target_kind: ObjectKind,
    name: String,
    tagger: Signature,
    message: Vec<u8>,
}

impl Tag {
    /// Assemble a new, unwritten tag.
    pub fn new(
        target: SparseObject,
        target_kind: ObjectKind,
        name: impl Into<String>,
        tagger: Signature,
        message: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: ObjectId::null(),
            target,
            target_kind,
            name: name.into(),
            tagger,
            message: message.into(),
        }
    }

    pub(crate) fn parse(id: ObjectId, data: &[u8], repo: &Arc<RepoShared>) -> StoreResult<Self> {
        let malformed = |reason: String| StoreError::MalformedObject {
            kind: ObjectKind::Tag,
            reason,
        };

        let (value, rest) =
            read_kv(data, b"object ").map_err(|_| malformed("missing object line".into()))?;
        let target_id = parse_id(value).map_err(&malformed)?;

        let (value, rest) =
            read_kv(rest, b"type ").map_err(|_| malformed("missing type line".into()))?;
        let kind_name = std::str::from_utf8(value)
            .map_err(|_| malformed("type is not UTF-8".into()))?;
        let target_kind =
            ObjectKind::from_name(kind_name).map_err(|e| malformed(e.to_string()))?;

        let (value, rest) =
            read_kv(rest, b"tag ").map_err(|_| malformed("missing tag line".into()))?;
        let name = std::str::from_utf8(value)
            .map_err(|_| malformed("tag name is not UTF-8".into()))?
            .to_string();

        let (value, rest) =
            read_kv(rest, b"tagger ").map_err(|_| malformed("missing tagger line".into()))?;
        let tagger = Signature::parse(value).map_err(&malformed)?;

        let message = match rest.first() {
            Some(b'\n') => rest[1..].to_vec(),
            _ => return Err(malformed("missing blank line before message".into())),
        };

        Ok(Self {
            id,
            target: SparseObject::new(target_id, repo),
            target_kind,
            name,
            tagger,
            message,
        })
    }

    pub fn serialize(&self) -> StoreResult<Vec<u8>> {
        let target_id = self.target.id();
        if target_id.is_null() {
            return Err(StoreError::UnwrittenChild {
                name: "object".to_string(),
            });
        }
        let mut buf = Vec::new();
        buf.extend_from_slice(
            format!(
                "object {}\ntype {}\ntag {}\ntagger {}\n\n",
                target_id.to_hex(),
                self.target_kind,
                self.name,
                self.tagger
            )
            .as_bytes(),
        );
        buf.extend_from_slice(&self.message);
        Ok(buf)
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The tagged object.
    pub fn target(&self) -> &SparseObject {
        &self.target
    }

    /// The kind the `type` line claims for the target.
    pub fn target_kind(&self) -> ObjectKind {
        self.target_kind
    }

    /// The tag's name (as in `refs/tags/<name>`).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tagger(&self) -> &Signature {
        &self.tagger
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.target.id() == other.target.id()
            && self.target_kind == other.target_kind
            && self.name == other.name
            && self.tagger == other.tagger
            && self.message == other.message
    }
}

impl Eq for Tag {}

#[cfg(test)]
mod tests {
    use crate::Repository;

    use super::*;

    const SAMPLE: &[u8] = b"object ce013625030ba8dba906f756967f9e9ca394464a\n\
        type commit\n\
        tag v2.1.0\n\
        tagger T Agger <tagger@example.com> 1700000002 +0000\n\
        \nRelease 2.1.0\n";

    fn repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn parse_reads_every_section() {
        let (_dir, repo) = repo();
        let tag = Tag::parse(ObjectId::from_raw([2; 20]), SAMPLE, repo.shared()).unwrap();
        assert_eq!(
            tag.target().id().to_hex(),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
        assert_eq!(tag.target_kind(), ObjectKind::Commit);
        assert_eq!(tag.name(), "v2.1.0");
        assert_eq!(tag.tagger().name, "T Agger");
        assert_eq!(tag.message(), b"Release 2.1.0\n");
    }

    #[test]
    fn serialize_reproduces_input_bytes() {
        let (_dir, repo) = repo();
        let tag = Tag::parse(ObjectId::from_raw([2; 20]), SAMPLE, repo.shared()).unwrap();
        assert_eq!(tag.serialize().unwrap(), SAMPLE);
    }

    #[test]
    fn parse_rejects_unknown_target_kind() {
        let (_dir, repo) = repo();
        let bad = b"object ce013625030ba8dba906f756967f9e9ca394464a\n\
            type branch\n\
            tag v0\n\
            tagger T <t@e> 1 +0000\n\n";
        let err = Tag::parse(ObjectId::null(), bad, repo.shared()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::MalformedObject {
                kind: ObjectKind::Tag,
                ..
            }
        ));
    }

    #[test]
    fn parse_rejects_missing_tagger() {
        let (_dir, repo) = repo();
        let bad = b"object ce013625030ba8dba906f756967f9e9ca394464a\n\
            type commit\n\
            tag v0\n\nmessage";
        assert!(Tag::parse(ObjectId::null(), bad, repo.shared()).is_err());
    }

    #[test]
    fn serialize_requires_written_target() {
        let tag = Tag::new(
            crate::SparseObject::from_object(crate::Object::from(crate::Blob::new(Vec::new()))),
            ObjectKind::Blob,
            "pending",
            Signature::new("T", "t@e", 1, 0),
            Vec::new(),
        );
        assert!(matches!(
            tag.serialize().unwrap_err(),
            StoreError::UnwrittenChild { .. }
        ));
    }
}

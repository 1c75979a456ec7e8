use crate::cascade::CascadeCipher;
use crate::envelope;
use crate::error::{GitCascadeError, Result};
use crate::kdf::KeyId;
use crate::rekey::RekeyTarget;
use git2::{AttrCheckFlags, Index, Repository};
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

/// Attribute value selecting the encryption filter
pub const FILTER_NAME: &str = "git-cascade";

// Index entry flags holding the merge stage
const STAGE_MASK: u16 = 0x3000;

pub struct GitRepo {
    repo: Repository,
}

impl GitRepo {
    /// Open repository at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let repo = Repository::discover(path).map_err(|_| GitCascadeError::NotInGitRepo)?;
        Ok(Self { repo })
    }

    /// Get the git directory path
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// Get repository root path
    pub fn workdir(&self) -> Result<&Path> {
        self.repo.workdir().ok_or(GitCascadeError::Other(
            "Repository has no working directory".into(),
        ))
    }

    /// Point git's clean/smudge filter at `program` and mark encrypted paths
    /// binary for diffs.
    pub fn configure_filters(&self, program: &str) -> Result<()> {
        let mut config = self.repo.config()?;
        let program = shell_quote(program);

        // Encrypts on add/commit
        config.set_str(
            &format!("filter.{FILTER_NAME}.clean"),
            &format!("{program} clean %f"),
        )?;

        // Decrypts on checkout
        config.set_str(
            &format!("filter.{FILTER_NAME}.smudge"),
            &format!("{program} smudge %f"),
        )?;

        config.set_bool(&format!("filter.{FILTER_NAME}.required"), true)?;

        // Git smudges blobs before any textconv sees them, so diffs are
        // suppressed instead
        config.set_bool(&format!("diff.{FILTER_NAME}.binary"), true)?;

        Ok(())
    }

    /// Remove git-cascade filters
    pub fn remove_filters(&self) -> Result<()> {
        let mut config = self.repo.config()?;

        for key in ["clean", "smudge", "required"] {
            let _ = config.remove(&format!("filter.{FILTER_NAME}.{key}"));
        }
        let _ = config.remove(&format!("diff.{FILTER_NAME}.binary"));

        Ok(())
    }

    pub fn filters_configured(&self) -> Result<bool> {
        let config = self.repo.config()?.snapshot()?;
        Ok(config
            .get_str(&format!("filter.{FILTER_NAME}.smudge"))
            .is_ok())
    }

    /// Whether `.gitattributes` routes `path` through the encryption filter.
    pub fn is_encrypted_path(&self, path: &str) -> Result<bool> {
        let value = self.repo.get_attr(
            Path::new(path),
            "filter",
            AttrCheckFlags::INDEX_THEN_FILE,
        )?;
        Ok(value == Some(FILTER_NAME))
    }

    /// A handle on the index for rewriting encrypted blobs.
    pub fn index_target(&self) -> Result<IndexTarget<'_>> {
        Ok(IndexTarget {
            repo: self,
            index: self.repo.index()?,
        })
    }

    /// Encrypted paths in the index with the key id each blob carries.
    ///
    /// `None` means the stored blob has no envelope header.
    pub fn encrypted_files(&self) -> Result<Vec<(String, Option<KeyId>)>> {
        let target = self.index_target()?;
        target
            .encrypted_paths()?
            .into_iter()
            .map(|path| {
                let stored = target.read_stored(&path)?;
                let key_id = envelope::parse(&stored).map(|(env, _, _)| env.key_id);
                Ok((path, key_id))
            })
            .collect()
    }
}

/// The git index as a [`RekeyTarget`].
///
/// Staged blobs keep the entry's stat data, so the (plaintext) working tree
/// still reads as clean after a rotation.
pub struct IndexTarget<'r> {
    repo: &'r GitRepo,
    index: Index,
}

impl RekeyTarget for IndexTarget<'_> {
    fn encrypted_paths(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        for entry in self.index.iter() {
            if entry.flags & STAGE_MASK != 0 {
                continue;
            }
            let path = String::from_utf8(entry.path)
                .map_err(|_| GitCascadeError::Other("non UTF-8 path in index".into()))?;
            if self.repo.is_encrypted_path(&path)? {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn pending_changes(&self) -> Result<Vec<String>> {
        let repo = &self.repo.repo;
        let head = repo.head().ok().and_then(|h| h.peel_to_tree().ok());
        let diff = repo.diff_tree_to_index(head.as_ref(), Some(&self.index), None)?;

        let mut paths = Vec::new();
        for delta in diff.deltas() {
            let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) else {
                continue;
            };
            let path = path.to_string_lossy().into_owned();
            if self.repo.is_encrypted_path(&path)? {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn read_stored(&self, path: &str) -> Result<Vec<u8>> {
        let entry = self
            .index
            .get_path(Path::new(path), 0)
            .ok_or_else(|| GitCascadeError::Other(format!("{path} is not in the index")))?;
        let blob = self.repo.repo.find_blob(entry.id)?;
        Ok(blob.content().to_vec())
    }

    fn stage(&mut self, path: &str, content: Vec<u8>) -> Result<()> {
        let mut entry = self
            .index
            .get_path(Path::new(path), 0)
            .ok_or_else(|| GitCascadeError::Other(format!("{path} is not in the index")))?;
        entry.id = self.repo.repo.blob(&content)?;
        self.index.add(&entry)?;
        debug!(path, blob = %entry.id, "staged re-encrypted blob");
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.index.write()?;
        Ok(())
    }
}

fn shell_quote(program: &str) -> String {
    if program
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./".contains(c))
    {
        program.to_string()
    } else {
        format!("'{}'", program.replace('\'', r"'\''"))
    }
}

/// Clean filter: encrypt file content
pub fn clean_filter(
    cipher: &CascadeCipher,
    path: &str,
    input: &mut impl Read,
    output: &mut impl Write,
) -> Result<()> {
    let mut data = Vec::new();
    input.read_to_end(&mut data)?;

    // Already encrypted
    if envelope::has_magic(&data) {
        output.write_all(&data)?;
        return Ok(());
    }

    let encrypted = cipher.encrypt(path, &data)?;
    output.write_all(&encrypted)?;

    Ok(())
}

/// Smudge filter: decrypt file content
pub fn smudge_filter(
    cipher: &CascadeCipher,
    path: &str,
    input: &mut impl Read,
    output: &mut impl Write,
) -> Result<()> {
    let mut data = Vec::new();
    input.read_to_end(&mut data)?;

    if envelope::has_magic(&data) {
        let decrypted = cipher.decrypt(path, &data)?;
        output.write_all(&decrypted)?;
        return Ok(());
    }

    // Headerless: legacy ciphertext, or content committed before the filter
    match cipher.decrypt(path, &data) {
        Ok(decrypted) => output.write_all(&decrypted)?,
        Err(_) => {
            debug!(path, "passing through unencrypted blob");
            output.write_all(&data)?;
        }
    }

    Ok(())
}

//! Guest data disk synthesis.
//!
//! boot2docker formats its data disk on first boot when the disk starts with
//! a tar archive whose first entry is the magic marker below. The rest of the
//! archive is unpacked into the docker user's home, which is how the public
//! key reaches `authorized_keys`.

use crate::error::Result;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};

/// First entry name of a disk boot2docker should format.
pub const FORMAT_MARKER: &str = "boot2docker, please format-me";

/// Build the tar payload written at the start of the disk.
fn archive(public_key: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut builder = Builder::new(Vec::new());

    let mut marker = Header::new_ustar();
    marker.set_size(FORMAT_MARKER.len() as u64);
    marker.set_mode(0o644);
    builder.append_data(&mut marker, FORMAT_MARKER, FORMAT_MARKER.as_bytes())?;

    let mut ssh_dir = Header::new_ustar();
    ssh_dir.set_entry_type(EntryType::Directory);
    ssh_dir.set_size(0);
    ssh_dir.set_mode(0o700);
    builder.append_data(&mut ssh_dir, ".ssh", std::io::empty())?;

    for name in [".ssh/authorized_keys", ".ssh/authorized_keys2"] {
        let mut key = Header::new_ustar();
        key.set_size(public_key.len() as u64);
        key.set_mode(0o644);
        builder.append_data(&mut key, name, public_key)?;
    }

    builder.into_inner()
}

/// Write a raw disk image of `size_mb` MB at `dest` carrying `public_key`.
///
/// The file is extended sparsely, so it only occupies the archive's blocks on
/// disk until the guest writes to it.
pub async fn create_disk_image(dest: &Path, public_key: Vec<u8>, size_mb: u64) -> Result<()> {
    tracing::debug!(path = %dest.display(), size_mb, "Creating disk image");
    let dest: PathBuf = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let payload = archive(&public_key)?;
        let size = size_mb << 20;
        if (payload.len() as u64) > size {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("disk of {size_mb} MB cannot hold a {} byte archive", payload.len()),
            ));
        }

        let mut file = File::create(&dest)?;
        file.write_all(&payload)?;
        file.seek(SeekFrom::Start(size - 1))?;
        file.write_all(&[0])?;
        file.sync_all()
    })
    .await
    .map_err(std::io::Error::other)??;

    Ok(())
}

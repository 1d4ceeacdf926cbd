//! Chunked file transfer over the `TransferFile` stream.
//!
//! Every transfer opens with exactly one control frame. Uploads follow it
//! with the file contents in 1 MiB data frames; downloads receive the
//! server's control frame and data frames until the stream closes.

use std::io;
use std::path::Path;

use futures_util::{future, stream, StreamExt};
use rexec_core::{RexecError, RexecResult, TransferFrame};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::session::SessionHandle;
use crate::transport::{OutboundFrames, RpcChannel};

/// Maximum payload of one data frame: 1 MiB.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Upload a local file to `remote_path`.
///
/// Calls `on_progress(sent, total)` after each data frame is produced.
/// Returns the number of bytes sent.
pub async fn upload<C, F>(
    session: &mut SessionHandle<C>,
    local_path: &Path,
    remote_path: &str,
    on_progress: F,
) -> RexecResult<u64>
where
    C: RpcChannel,
    F: FnMut(u64, u64) + Send + 'static,
{
    let metadata = match tokio::fs::metadata(local_path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(RexecError::LocalFileNotFound(local_path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    if !metadata.is_file() {
        return Err(RexecError::Transfer(format!(
            "{} is not a regular file",
            local_path.display()
        )));
    }

    let total = metadata.len();
    let file = File::open(local_path).await.map_err(|e| {
        RexecError::Transfer(format!("cannot open {}: {e}", local_path.display()))
    })?;

    send_file(session, file, total, local_path, remote_path, on_progress).await
}

/// Stream an opened local file of `total` bytes to `remote_path`.
async fn send_file<C, F>(
    session: &mut SessionHandle<C>,
    file: File,
    total: u64,
    local_path: &Path,
    remote_path: &str,
    on_progress: F,
) -> RexecResult<u64>
where
    C: RpcChannel,
    F: FnMut(u64, u64) + Send + 'static,
{
    let (read_error_tx, mut read_error_rx) = oneshot::channel();
    let control = TransferFrame::upload(local_path.display().to_string(), remote_path, total);
    let outbound = upload_frames(
        control,
        UploadSource {
            file,
            sent: 0,
            total,
            chunk_size: CHUNK_SIZE,
            on_progress,
            read_error: Some(read_error_tx),
        },
    );

    let mut inbound = session
        .channel_mut()
        .transfer_file(outbound)
        .await
        .map_err(transfer_error)?;

    let mut acknowledged = None;
    while let Some(frame) = inbound.next().await {
        match frame.map_err(|e| RexecError::Transfer(e.to_string()))? {
            TransferFrame::Control(info) => {
                debug!(remote = %info.remote_path, size = info.file_size, "upload acknowledged");
                acknowledged = Some(info.file_size);
            }
            TransferFrame::Data(data) => {
                debug!(len = data.len(), "ignoring data frame during upload");
            }
        }
    }

    if let Ok(e) = read_error_rx.try_recv() {
        return Err(RexecError::Transfer(format!(
            "failed reading {}: {e}",
            local_path.display()
        )));
    }

    match acknowledged {
        Some(size) if size != total => {
            warn!(sent = total, acknowledged = size, "remote size differs from bytes sent")
        }
        Some(_) => {}
        None => debug!("server sent no acknowledgement"),
    }

    tracing::info!(
        "uploaded {} bytes from '{}' to '{}'",
        total,
        local_path.display(),
        remote_path
    );

    Ok(total)
}

/// Download `remote_path` into `local_path`, overwriting it.
///
/// Calls `on_progress(received, announced)` after each data frame, where
/// `announced` is the size from the server's control frame (0 until seen).
/// A failed transfer may leave a partial local file.
pub async fn download<C, F>(
    session: &mut SessionHandle<C>,
    remote_path: &str,
    local_path: &Path,
    mut on_progress: F,
) -> RexecResult<u64>
where
    C: RpcChannel,
    F: FnMut(u64, u64),
{
    let outbound = stream::iter([TransferFrame::download(remote_path)]).boxed();
    let mut inbound = session
        .channel_mut()
        .transfer_file(outbound)
        .await
        .map_err(transfer_error)?;

    let write_error =
        |e: io::Error| RexecError::Transfer(format!("cannot write {}: {e}", local_path.display()));

    let mut file = File::create(local_path).await.map_err(write_error)?;
    let mut received: u64 = 0;
    let mut announced = None;

    while let Some(frame) = inbound.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                // Whatever arrived stays on disk.
                file.flush().await.map_err(write_error)?;
                return Err(RexecError::Transfer(e.to_string()));
            }
        };
        match frame {
            TransferFrame::Data(data) => {
                file.write_all(&data).await.map_err(write_error)?;
                received += data.len() as u64;
                on_progress(received, announced.unwrap_or(0));
            }
            TransferFrame::Control(info) => {
                debug!(remote = %info.remote_path, size = info.file_size, "download announced");
                announced = Some(info.file_size);
            }
        }
    }

    file.flush().await.map_err(write_error)?;
    file.sync_all().await.map_err(write_error)?;

    if let Some(size) = announced.filter(|size| *size != received) {
        warn!(announced = size, received, "downloaded size differs from announced size");
    }

    tracing::info!(
        "downloaded {} bytes from '{}' to '{}'",
        received,
        remote_path,
        local_path.display()
    );

    Ok(received)
}

/// Transport failures during a transfer are reported as transfer errors.
fn transfer_error(err: RexecError) -> RexecError {
    match err {
        RexecError::Rpc(e) => RexecError::Transfer(e.to_string()),
        other => other,
    }
}

struct UploadSource<F> {
    file: File,
    sent: u64,
    total: u64,
    chunk_size: usize,
    on_progress: F,
    read_error: Option<oneshot::Sender<io::Error>>,
}

/// The control frame followed by the file contents in full chunks.
///
/// A read error ends the stream early and is handed back through
/// `read_error`.
fn upload_frames<F>(control: TransferFrame, source: UploadSource<F>) -> OutboundFrames
where
    F: FnMut(u64, u64) + Send + 'static,
{
    let data = stream::unfold(source, |mut source| async move {
        let mut buf = vec![0u8; source.chunk_size];
        match fill_chunk(&mut source.file, &mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                source.sent += n as u64;
                (source.on_progress)(source.sent, source.total);
                Some((TransferFrame::Data(buf), source))
            }
            Err(e) => {
                if let Some(tx) = source.read_error.take() {
                    let _ = tx.send(e);
                }
                None
            }
        }
    });

    stream::once(future::ready(control)).chain(data).boxed()
}

/// Read until `buf` is full or EOF. Returns the bytes read.
async fn fill_chunk(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

use {
    bytes::Bytes,
    std::io::Read,
    tokio::{
        runtime::{Handle, RuntimeFlavor},
        sync::mpsc,
        task::block_in_place,
    },
    tokio_stream::{Stream, wrappers::ReceiverStream},
    tracing::warn,
};

const CONTENT_CHUNK_LEN: usize = 64 * 1024;

/// Runs blocking I/O without stalling other tasks when the runtime allows it.
///
/// `block_in_place` panics on a current-thread runtime, so it's only used on a
/// multi-threaded one.
pub fn maybe_block_in_place<R>(f: impl FnOnce() -> R) -> R {
    let multi_thread = Handle::try_current()
        .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread);
    if multi_thread { block_in_place(f) } else { f() }
}

/// Streams `file` in chunks from a background task.
///
/// A read error ends the stream early; the receiver sees a short body.
pub fn stream_file(mut file: impl Read + Send + 'static) -> impl Stream<Item = Bytes> {
    let (tx, rx) = mpsc::channel(5);
    tokio::spawn(async move {
        let mut buf = vec![0u8; CONTENT_CHUNK_LEN];
        loop {
            match maybe_block_in_place(|| file.read(&mut buf)) {
                Ok(0) => break,
                Ok(len) => {
                    let Some(chunk) = buf.get(..len) else {
                        break;
                    };
                    if tx.send(Bytes::copy_from_slice(chunk)).await.is_err() {
                        break; // receiver closed
                    }
                }
                Err(err) => {
                    warn!(?err, "failed to read content file");
                    break;
                }
            }
        }
    });
    ReceiverStream::new(rx)
}

/// Guesses a MIME type from the file extension.
#[must_use]
pub fn mime_from_name(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "gpg" | "pgp" => "application/pgp-encrypted",
        _ => "application/octet-stream",
    }
}

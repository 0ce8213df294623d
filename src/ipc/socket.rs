// Socket Adapter
// Bridges a Unix domain socket carrying length-prefixed frames to the
// in-process channel types. Must be called inside a `LocalSet`.

use std::io;
use std::path::Path;

use log::{debug, error, info};
use tokio::net::UnixStream;
use tokio::sync::mpsc;

use super::MemoryChannel;
use super::codec::{read_frame, write_frame};

/// Connect to the server socket. Returns the outbound channel and the
/// receiver of inbound frames; the receiver closes when the socket does.
pub async fn connect<P: AsRef<Path>>(path: P) -> io::Result<(MemoryChannel, mpsc::UnboundedReceiver<Vec<u8>>)> {
    let path = path.as_ref();
    let stream = UnixStream::connect(path).await?;
    info!("[IPC] connected to {}", path.display());
    let (mut reader, mut writer) = stream.into_split();

    let (channel, mut outgoing) = MemoryChannel::pair();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    tokio::task::spawn_local(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(frame)) => {
                    if inbound_tx.send(frame).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("[IPC] server closed the socket");
                    break;
                }
                Err(e) => {
                    error!("[IPC] read failed: {e}");
                    break;
                }
            }
        }
    });

    let status = channel.clone();
    tokio::task::spawn_local(async move {
        while let Some(frame) = outgoing.recv().await {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                error!("[IPC] write failed: {e}");
                status.close();
                break;
            }
        }
    });

    Ok((channel, inbound_rx))
}

use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::Command;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::handle::{PipeDirection, PipeHandle};
use crate::pipe::{raw_pipe, set_cloexec, PipeEnd};
use crate::traits::Close;

/// Server side of one anonymous pipe: the local end plus the client end
/// that is waiting to be inherited by a child process.
pub struct AnonymousPipeServer {
    local: PipeEnd,
    client: Option<OwnedFd>,
}

impl AnonymousPipeServer {
    /// Allocate a pipe whose local end flows in `direction`.
    pub fn new(direction: PipeDirection) -> Result<Self> {
        let (read, write) = raw_pipe().map_err(TransportError::Create)?;
        let (local, client) = match direction {
            PipeDirection::In => (read, write),
            PipeDirection::Out => (write, read),
        };
        debug!(
            local_fd = local.as_raw_fd(),
            client_fd = client.as_raw_fd(),
            %direction,
            "created anonymous pipe"
        );
        Ok(Self {
            local: PipeEnd::from_owned(local, direction),
            client: Some(client),
        })
    }

    /// Descriptor a child process uses to attach to the client end.
    pub fn client_handle(&self) -> Result<PipeHandle> {
        self.client
            .as_ref()
            .map(|fd| PipeHandle::from_raw(fd.as_raw_fd()))
            .ok_or(TransportError::Closed)
    }

    /// Close this process's copy of the client end.
    ///
    /// Must be called once the child has been spawned; while the parent
    /// still holds a copy, the pipe never reports end-of-stream after the
    /// child closes its end. Safe to call more than once.
    pub fn release_local_client_copy(&mut self) {
        if let Some(client) = self.client.take() {
            debug!(client_fd = client.as_raw_fd(), "released local client handle");
        }
    }

    /// Whether the client end is still held by this process.
    pub fn holds_client_copy(&self) -> bool {
        self.client.is_some()
    }

    /// The local end.
    pub fn local_mut(&mut self) -> &mut PipeEnd {
        &mut self.local
    }

    /// Consume the server, releasing the client copy and returning the
    /// local end.
    pub fn into_local(mut self) -> PipeEnd {
        self.release_local_client_copy();
        self.local
    }
}

impl Close for AnonymousPipeServer {
    fn close(&mut self) -> Result<()> {
        self.release_local_client_copy();
        self.local.close()
    }

    fn is_closed(&self) -> bool {
        self.client.is_none() && self.local.is_closed()
    }
}

/// The two descriptors a responder needs, from the responder's view.
///
/// `write` is the client end of the parent's inbound pipe; `read` is the
/// client end of the parent's outbound pipe. On the command line they
/// appear in that order.
#[derive(Debug, PartialEq, Eq)]
pub struct ClientHandles {
    pub write: PipeHandle,
    pub read: PipeHandle,
}

impl ClientHandles {
    /// Positional arguments for the child process: `[write, read]`.
    pub fn to_args(&self) -> [String; 2] {
        [self.write.to_string(), self.read.to_string()]
    }

    /// Parse handles from a child's positional arguments.
    ///
    /// Returns `Ok(None)` when fewer than two arguments were given, which
    /// means the process was not started as a responder. Extra arguments
    /// are ignored.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Option<Self>> {
        let [write, read, ..] = args else {
            return Ok(None);
        };
        Ok(Some(Self {
            write: PipeHandle::parse(write.as_ref())?,
            read: PipeHandle::parse(read.as_ref())?,
        }))
    }
}

/// Both local ends of a duplex conversation.
#[derive(Debug)]
pub struct DuplexEnds {
    pub reader: PipeEnd,
    pub writer: PipeEnd,
}

impl Close for DuplexEnds {
    fn close(&mut self) -> Result<()> {
        let reader = self.reader.close();
        let writer = self.writer.close();
        reader.and(writer)
    }

    fn is_closed(&self) -> bool {
        self.reader.is_closed() && self.writer.is_closed()
    }
}

/// Parent side of a duplex pipe pair.
///
/// `out` carries bytes to the child, `inbound` carries bytes back. The
/// child sees the same two pipes with the roles swapped.
pub struct DuplexPipeServer {
    out: AnonymousPipeServer,
    inbound: AnonymousPipeServer,
}

impl DuplexPipeServer {
    /// Allocate both pipes.
    pub fn create() -> Result<Self> {
        let inbound = AnonymousPipeServer::new(PipeDirection::In)?;
        let out = AnonymousPipeServer::new(PipeDirection::Out)?;
        info!("created duplex pipe pair");
        Ok(Self { out, inbound })
    }

    /// Handles to pass to the child, in responder orientation.
    pub fn client_handles(&self) -> Result<ClientHandles> {
        Ok(ClientHandles {
            write: self.inbound.client_handle()?,
            read: self.out.client_handle()?,
        })
    }

    /// Append the client handles to `command` and arrange for exactly those
    /// two descriptors to be inherited by the spawned process.
    pub fn configure_command(&self, command: &mut Command) -> Result<()> {
        let handles = self.client_handles()?;
        let inherit = [handles.write.as_raw(), handles.read.as_raw()];
        command.args(handles.to_args());

        // SAFETY: the hook runs between fork and exec and only calls
        // fcntl(2), which is async-signal-safe. It allocates nothing.
        unsafe {
            command.pre_exec(move || {
                for fd in inherit {
                    set_cloexec(fd, false)?;
                }
                Ok(())
            });
        }
        Ok(())
    }

    /// Release the parent's copies of both client ends.
    pub fn release_local_client_copy(&mut self) {
        self.out.release_local_client_copy();
        self.inbound.release_local_client_copy();
    }

    /// Whether either client end is still held by this process.
    pub fn holds_client_copy(&self) -> bool {
        self.out.holds_client_copy() || self.inbound.holds_client_copy()
    }

    /// Outbound end (parent writes).
    pub fn writer_mut(&mut self) -> &mut PipeEnd {
        self.out.local_mut()
    }

    /// Inbound end (parent reads).
    pub fn reader_mut(&mut self) -> &mut PipeEnd {
        self.inbound.local_mut()
    }

    /// Split into the two local ends, releasing any client copies.
    pub fn into_ends(self) -> DuplexEnds {
        DuplexEnds {
            reader: self.inbound.into_local(),
            writer: self.out.into_local(),
        }
    }
}

impl Close for DuplexPipeServer {
    fn close(&mut self) -> Result<()> {
        let out = self.out.close();
        let inbound = self.inbound.close();
        out.and(inbound)
    }

    fn is_closed(&self) -> bool {
        self.out.is_closed() && self.inbound.is_closed()
    }
}

/// Child side: open the inherited ends named by `handles`.
///
/// The write handle is opened first; if the read handle then fails, the
/// already-opened end is released before the error is returned.
pub fn attach(handles: ClientHandles) -> Result<DuplexEnds> {
    let ClientHandles { write, read } = handles;
    let writer = PipeEnd::attach(write, PipeDirection::Out)?;
    let reader = PipeEnd::attach(read, PipeDirection::In)?;
    info!("attached duplex pipe pair");
    Ok(DuplexEnds { reader, writer })
}

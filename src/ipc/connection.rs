use log::debug;
use std::io::{self, Read, Write};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

#[cfg(windows)]
use std::fs::{File, OpenOptions};
#[cfg(windows)]
use std::os::windows::io::AsRawHandle;
#[cfg(windows)]
use windows_sys::Win32::{Foundation::ERROR_BROKEN_PIPE, System::Pipes::PeekNamedPipe};

use crate::config::{PipeConfig, RpcConfig};
use crate::error::{codes, Result, RpcError};
use crate::ipc::codec::{Frame, FrameDecoder};
use crate::ipc::protocol::constants;
use crate::transport::Transport;

/// A pipe found during discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPipe {
    pub path: String,
    pub index: u8,
}

/// Platform IPC transport: a Unix domain socket or a Windows named pipe
pub struct IpcTransport {
    pipe: PipeConfig,
    max_sockets: u8,
    decoder: FrameDecoder,
    #[cfg(unix)]
    stream: Option<UnixStream>,
    #[cfg(windows)]
    pipe_file: Option<File>,
}

impl IpcTransport {
    const READ_CHUNK: usize = 4096;

    pub fn new(config: &RpcConfig) -> Self {
        Self {
            pipe: config.pipe.clone(),
            max_sockets: config.max_sockets,
            decoder: FrameDecoder::new(config.max_payload_size),
            #[cfg(unix)]
            stream: None,
            #[cfg(windows)]
            pipe_file: None,
        }
    }

    /// Candidate pipe paths in the order they are tried
    pub fn candidate_paths(max_sockets: u8) -> Vec<String> {
        let mut paths = Vec::new();

        #[cfg(unix)]
        {
            let env_keys = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"];
            let mut directories: Vec<String> = env_keys
                .iter()
                .filter_map(|key| std::env::var(key).ok())
                .collect();

            // SAFETY: getuid has no preconditions and cannot fail
            directories.push(format!("/run/user/{}", unsafe { libc::getuid() }));
            directories.push("/tmp".to_string());
            directories.dedup();

            // Sandboxed clients put their socket one level down
            let subdirs = ["", "app/com.discordapp.Discord/", "snap.discord/"];

            for dir in &directories {
                let dir = dir.trim_end_matches('/');
                for subdir in &subdirs {
                    for i in 0..max_sockets {
                        paths.push(format!(
                            "{}/{}{}{}",
                            dir,
                            subdir,
                            constants::IPC_SOCKET_PREFIX,
                            i
                        ));
                    }
                }
            }
        }

        #[cfg(windows)]
        {
            for i in 0..max_sockets {
                paths.push(format!(r"\\?\pipe\{}{}", constants::IPC_SOCKET_PREFIX, i));
            }
        }

        paths
    }

    /// List the pipes that currently exist on this machine
    pub fn discover_pipes(max_sockets: u8) -> Vec<DiscoveredPipe> {
        Self::existing_pipes(Self::candidate_paths(max_sockets))
    }

    fn existing_pipes(paths: Vec<String>) -> Vec<DiscoveredPipe> {
        paths
            .into_iter()
            .filter(|path| std::path::Path::new(path).exists())
            .filter_map(|path| {
                let index = path
                    .rsplit(constants::IPC_SOCKET_PREFIX)
                    .next()
                    .and_then(|n| n.parse().ok())?;
                Some(DiscoveredPipe { path, index })
            })
            .collect()
    }

    fn paths_to_try(&self) -> Vec<String> {
        match &self.pipe {
            PipeConfig::Auto => Self::candidate_paths(self.max_sockets),
            PipeConfig::CustomPath(path) => vec![path.clone()],
        }
    }

    fn no_pipe_error(last_error: Option<io::Error>) -> RpcError {
        match last_error {
            Some(err) if err.kind() == io::ErrorKind::PermissionDenied => RpcError::transport(
                codes::PIPE_CLOSED,
                "Permission denied when opening the IPC pipe",
            ),
            Some(err) => RpcError::transport(codes::PIPE_CLOSED, err.to_string()),
            None => RpcError::transport(codes::PIPE_CLOSED, "No IPC pipe found"),
        }
    }

    fn closed(&mut self) -> RpcError {
        self.close();
        RpcError::transport(codes::PIPE_CLOSED, "Pipe closed by peer")
    }

    #[cfg(unix)]
    fn open(&mut self) -> Result {
        let mut last_error = None;

        for path in self.paths_to_try() {
            match UnixStream::connect(&path) {
                Ok(stream) => {
                    stream.set_nonblocking(true)?;
                    debug!("Opened IPC socket {}", path);
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(err) => last_error = Some(err),
            }
        }

        Err(Self::no_pipe_error(last_error))
    }

    #[cfg(windows)]
    fn open(&mut self) -> Result {
        let mut last_error = None;

        for path in self.paths_to_try() {
            match OpenOptions::new().read(true).write(true).open(&path) {
                Ok(file) => {
                    debug!("Opened IPC pipe {}", path);
                    self.pipe_file = Some(file);
                    return Ok(());
                }
                Err(err) => last_error = Some(err),
            }
        }

        Err(Self::no_pipe_error(last_error))
    }

    #[cfg(unix)]
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        // Frames are small; block for the duration of one write.
        stream.set_nonblocking(false)?;
        let written = stream.write_all(bytes);
        stream.set_nonblocking(true)?;
        written
    }

    #[cfg(windows)]
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let pipe = self
            .pipe_file
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        pipe.write_all(bytes)?;
        pipe.flush()
    }

    /// Bytes waiting in the pipe, or `None` once the peer has closed it
    #[cfg(windows)]
    fn bytes_available(pipe: &File) -> io::Result<Option<usize>> {
        let mut available: u32 = 0;
        // SAFETY: the handle is owned by `pipe` and stays open for the call;
        // a null buffer asks only for the byte count.
        let ok = unsafe {
            PeekNamedPipe(
                pipe.as_raw_handle() as _,
                std::ptr::null_mut(),
                0,
                std::ptr::null_mut(),
                &mut available,
                std::ptr::null_mut(),
            )
        };
        if ok != 0 {
            return Ok(Some(available as usize));
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(ERROR_BROKEN_PIPE as i32) {
            return Ok(None);
        }
        Err(err)
    }

    /// Move whatever is readable right now into the decoder.
    /// Returns `false` once the peer has closed its end.
    #[cfg(unix)]
    fn fill(&mut self) -> io::Result<bool> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        };

        let mut chunk = [0u8; Self::READ_CHUNK];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => self.decoder.extend(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    #[cfg(windows)]
    fn fill(&mut self) -> io::Result<bool> {
        let Some(pipe) = self.pipe_file.as_mut() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        };

        // Only read what is already there so the read never blocks
        let mut chunk = [0u8; Self::READ_CHUNK];
        loop {
            let available = match Self::bytes_available(pipe)? {
                None => return Ok(false),
                Some(0) => return Ok(true),
                Some(n) => n.min(Self::READ_CHUNK),
            };
            match pipe.read(&mut chunk[..available]) {
                Ok(0) => return Ok(false),
                Ok(n) => self.decoder.extend(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

impl Transport for IpcTransport {
    fn connect(&mut self) -> Result {
        self.close();
        self.open()
    }

    fn send(&mut self, frame: &Frame) -> Result {
        let bytes = frame.encode()?;
        debug!("-> {:?} {}", frame.opcode, frame.payload);
        self.write_bytes(&bytes).map_err(|err| {
            self.close();
            RpcError::transport(codes::PIPE_CLOSED, err.to_string())
        })
    }

    fn receive(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.decoder.next_frame()? {
            return Ok(Some(frame));
        }

        match self.fill() {
            Ok(true) => {}
            Ok(false) => {
                // Frames that arrived right before EOF are still delivered
                if let Some(frame) = self.decoder.next_frame()? {
                    return Ok(Some(frame));
                }
                return Err(self.closed());
            }
            Err(_) => return Err(self.closed()),
        }

        let frame = self.decoder.next_frame()?;
        if let Some(frame) = &frame {
            debug!("<- {:?} {}", frame.opcode, frame.payload);
        }
        Ok(frame)
    }

    fn close(&mut self) {
        #[cfg(unix)]
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }

        #[cfg(windows)]
        {
            // Dropping the handle closes our end of the pipe
            self.pipe_file = None;
        }

        self.decoder.clear();
    }
}

impl Drop for IpcTransport {
    fn drop(&mut self) {
        self.close();
    }
}

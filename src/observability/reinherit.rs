//! Log file re-inheritance from the watchdog.
//!
//! The watchdog owns the daemon's log file. After it reopens the file (for
//! example on rotation) it can hand the new descriptor over: we connect to its
//! API socket inside the instance directory, authenticate with the
//! fd-passing password, and receive the descriptor over `SCM_RIGHTS`.

use std::fs::File;
use std::io::{self, Write};
use std::mem::size_of;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

const WATCHDOG_SOCKET: &str = "agents.s/watchdog_api";
const IO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ReinheritError {
    #[error("no watchdog is configured for this daemon")]
    NotConfigured,
    #[error("cannot contact the watchdog at {}: {source}", path.display())]
    Connect { path: PathBuf, source: io::Error },
    #[error("error receiving the log file descriptor: {0}")]
    Receive(#[from] io::Error),
}

/// Fetch the current log file from the watchdog.
pub fn fetch_log_file(instance_dir: &str, fd_passing_password: &str) -> Result<File, ReinheritError> {
    if instance_dir.is_empty() || fd_passing_password.is_empty() {
        return Err(ReinheritError::NotConfigured);
    }

    let path = Path::new(instance_dir).join(WATCHDOG_SOCKET);
    let mut stream = UnixStream::connect(&path).map_err(|source| ReinheritError::Connect {
        path: path.clone(),
        source,
    })?;
    stream.set_read_timeout(Some(IO_TIMEOUT))?;
    stream.set_write_timeout(Some(IO_TIMEOUT))?;

    write!(
        stream,
        "GET /config/log_file.fd HTTP/1.1\r\n\
         Connection: close\r\n\
         Fd-Passing-Password: {}\r\n\r\n",
        fd_passing_password
    )?;

    let fd = receive_fd(&stream)?;
    Ok(File::from(fd))
}

/// Control buffer capacity, in descriptors. A message carrying more than
/// this is truncated by the kernel and rejected.
const MAX_FDS: usize = 4;

fn receive_fd(stream: &UnixStream) -> io::Result<OwnedFd> {
    let mut data = [0u8; 1];
    let mut iov = libc::iovec {
        iov_base: data.as_mut_ptr().cast(),
        iov_len: data.len(),
    };

    // SAFETY: CMSG_SPACE only computes a size.
    let space = unsafe { libc::CMSG_SPACE((MAX_FDS * size_of::<RawFd>()) as u32) } as usize;
    // u64 words keep the buffer aligned for cmsghdr.
    let mut control = vec![0u64; space.div_ceil(size_of::<u64>())];

    // SAFETY: msghdr is a plain C struct; all-zeroes is a valid empty header.
    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr().cast();
    msg.msg_controllen = space as _;

    // SAFETY: msg points at buffers that outlive the call.
    let n = unsafe { libc::recvmsg(stream.as_raw_fd(), &mut msg, 0) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: msg was filled in by recvmsg and control is still alive.
    let fds = unsafe { take_fds(&msg) };
    if msg.msg_flags & libc::MSG_CTRUNC != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "watchdog sent more descriptors than expected",
        ));
    }
    if fds.len() > 1 {
        tracing::warn!(extra = fds.len() - 1, "Closing extra descriptors sent by the watchdog");
    }

    match fds.into_iter().next() {
        Some(fd) => Ok(fd),
        None if n == 0 => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "watchdog closed the connection without sending a descriptor",
        )),
        None => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "watchdog response did not carry a file descriptor",
        )),
    }
}

/// Take ownership of every descriptor in the `SCM_RIGHTS` messages of `msg`.
///
/// # Safety
///
/// `msg` must have been filled in by `recvmsg`, and its control buffer must
/// still be alive.
unsafe fn take_fds(msg: &libc::msghdr) -> Vec<OwnedFd> {
    let mut fds = Vec::new();
    let mut cmsg = libc::CMSG_FIRSTHDR(msg);
    while !cmsg.is_null() {
        if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
            let data = libc::CMSG_DATA(cmsg).cast::<RawFd>();
            let len = ((*cmsg).cmsg_len as usize).saturating_sub(libc::CMSG_LEN(0) as usize);
            for i in 0..len / size_of::<RawFd>() {
                fds.push(OwnedFd::from_raw_fd(std::ptr::read_unaligned(data.add(i))));
            }
        }
        cmsg = libc::CMSG_NXTHDR(msg, cmsg);
    }
    fds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_configured() {
        assert!(matches!(fetch_log_file("", "secret"), Err(ReinheritError::NotConfigured)));
        assert!(matches!(fetch_log_file("/tmp", ""), Err(ReinheritError::NotConfigured)));
    }

    #[test]
    fn test_missing_watchdog() {
        let dir = tempfile::tempdir().unwrap();
        let err = fetch_log_file(dir.path().to_str().unwrap(), "secret").unwrap_err();
        assert!(matches!(err, ReinheritError::Connect { .. }));
        assert!(err.to_string().contains("agents.s/watchdog_api"));
    }

    /// Send `fds` over `stream` the way the watchdog does.
    fn send_fds(stream: &UnixStream, fds: &[RawFd]) {
        let mut data = [b'x'];
        let mut iov = libc::iovec {
            iov_base: data.as_mut_ptr().cast(),
            iov_len: data.len(),
        };
        let fd_size = std::mem::size_of_val(fds);
        let space = unsafe { libc::CMSG_SPACE(fd_size as u32) } as usize;
        let mut control = vec![0u64; space.div_ceil(size_of::<u64>())];

        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr().cast();
        msg.msg_controllen = space as _;

        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            (*cmsg).cmsg_len = libc::CMSG_LEN(fd_size as u32) as _;
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            std::ptr::copy_nonoverlapping(fds.as_ptr(), libc::CMSG_DATA(cmsg).cast::<RawFd>(), fds.len());
            assert_eq!(libc::sendmsg(stream.as_raw_fd(), &msg, 0), 1);
        }
    }

    fn open_log(dir: &Path, name: &str) -> File {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(name))
            .unwrap()
    }

    #[test]
    fn test_receive_single_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(dir.path(), "router.log");
        let (ours, watchdog) = UnixStream::pair().unwrap();

        send_fds(&watchdog, &[log.as_raw_fd()]);
        drop(log);
        let mut received = File::from(receive_fd(&ours).unwrap());
        received.write_all(b"inherited\n").unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("router.log")).unwrap(),
            "inherited\n"
        );
    }

    #[test]
    fn test_extra_descriptors_closed() {
        let dir = tempfile::tempdir().unwrap();
        let first = open_log(dir.path(), "first.log");
        let second = open_log(dir.path(), "second.log");
        let (ours, watchdog) = UnixStream::pair().unwrap();

        send_fds(&watchdog, &[first.as_raw_fd(), second.as_raw_fd()]);
        let mut received = File::from(receive_fd(&ours).unwrap());
        received.write_all(b"first\n").unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("first.log")).unwrap(), "first\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("second.log")).unwrap(), "");
    }

    #[test]
    fn test_too_many_descriptors_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<File> = (0..MAX_FDS + 1)
            .map(|i| open_log(dir.path(), &format!("{i}.log")))
            .collect();
        let fds: Vec<RawFd> = files.iter().map(AsRawFd::as_raw_fd).collect();
        let (ours, watchdog) = UnixStream::pair().unwrap();

        send_fds(&watchdog, &fds);
        let err = receive_fd(&ours).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_no_descriptor() {
        let (ours, mut watchdog) = UnixStream::pair().unwrap();
        watchdog.write_all(b"H").unwrap();
        let err = receive_fd(&ours).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        drop(watchdog);
        let err = receive_fd(&ours).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_fetch_from_watchdog() {
        use std::io::{BufRead, BufReader};
        use std::os::unix::net::UnixListener;

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("agents.s")).unwrap();
        let listener = UnixListener::bind(dir.path().join(WATCHDOG_SOCKET)).unwrap();
        let log = open_log(dir.path(), "router.log");

        let watchdog = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut head = Vec::new();
            let mut reader = BufReader::new(&stream);
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                head.push(line.trim_end().to_string());
            }
            send_fds(&stream, &[log.as_raw_fd()]);
            head
        });

        let mut file = fetch_log_file(dir.path().to_str().unwrap(), "secret").unwrap();
        file.write_all(b"adopted\n").unwrap();

        let head = watchdog.join().unwrap();
        assert_eq!(head[0], "GET /config/log_file.fd HTTP/1.1");
        assert!(head.contains(&"Fd-Passing-Password: secret".to_string()));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("router.log")).unwrap(),
            "adopted\n"
        );
    }
}

//! Process terminal backed by the controlling tty's stdin/stdout.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, OnceLock,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, error};

use crate::core::terminal::Terminal;

#[cfg(unix)]
use libc::{self, c_int};
#[cfg(unix)]
use signal_hook::iterator::Signals;

const PASTE_START: &str = "\x1b[200~";
const PASTE_END: &str = "\x1b[201~";
const INPUT_POLL_MS: i32 = 50;

/// Reset written by the panic hook: cursor on, paste off, primary screen.
const PANIC_RESET: &str = "\x1b[0m\x1b[?25h\x1b[?2004l\x1b[?1049l";

type InputHandler = Arc<Mutex<Option<Box<dyn FnMut(String) + Send>>>>;
type ResizeHandler = Arc<Mutex<Option<Box<dyn FnMut() + Send>>>>;

#[cfg(unix)]
static ORIGINAL_TERMIOS: OnceLock<(c_int, libc::termios)> = OnceLock::new();

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis() as u64
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Reassembles raw stdin bytes into chunks safe to hand to the input parser.
///
/// Incomplete UTF-8 tails and unterminated bracketed pastes are held back
/// until the next read completes them.
#[derive(Debug, Default)]
struct InputAssembler {
    bytes: Vec<u8>,
    text: String,
}

impl InputAssembler {
    fn push(&mut self, data: &[u8]) -> Option<String> {
        self.bytes.extend_from_slice(data);
        let valid = match std::str::from_utf8(&self.bytes) {
            Ok(text) => text.len(),
            Err(err) if err.error_len().is_some() => {
                // Invalid bytes never become valid; decode lossily and move on.
                let lossy = String::from_utf8_lossy(&self.bytes).into_owned();
                self.bytes.clear();
                self.text.push_str(&lossy);
                return self.take_ready();
            }
            Err(err) => err.valid_up_to(),
        };
        let rest = self.bytes.split_off(valid);
        let decoded = std::mem::replace(&mut self.bytes, rest);
        self.text.push_str(&String::from_utf8_lossy(&decoded));
        self.take_ready()
    }

    fn take_ready(&mut self) -> Option<String> {
        if let Some(start) = self.text.rfind(PASTE_START) {
            if !self.text[start..].contains(PASTE_END) {
                if start == 0 {
                    return None;
                }
                let pending = self.text.split_off(start);
                return Some(std::mem::replace(&mut self.text, pending));
            }
        }
        if self.text.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.text))
        }
    }
}

#[cfg(unix)]
fn wait_writable(fd: c_int) -> std::io::Result<()> {
    let mut fds = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    loop {
        let result = unsafe { libc::poll(&mut fds, 1, -1) };
        if result < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        return Ok(());
    }
}

#[cfg(unix)]
fn write_fd(fd: c_int, data: &str) -> std::io::Result<()> {
    let mut remaining = data.as_bytes();
    while !remaining.is_empty() {
        let result =
            unsafe { libc::write(fd, remaining.as_ptr() as *const libc::c_void, remaining.len()) };
        if result < 0 {
            let err = std::io::Error::last_os_error();
            match err.kind() {
                std::io::ErrorKind::Interrupted => continue,
                std::io::ErrorKind::WouldBlock => {
                    wait_writable(fd)?;
                    continue;
                }
                _ => return Err(err),
            }
        }
        if result == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "terminal accepted no bytes",
            ));
        }
        remaining = &remaining[result as usize..];
    }
    Ok(())
}

#[cfg(unix)]
fn read_winsize(fd: c_int) -> Option<(u16, u16)> {
    let mut size = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let result = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut size) };
    if result == 0 && size.ws_col > 0 && size.ws_row > 0 {
        Some((size.ws_col, size.ws_row))
    } else {
        None
    }
}

#[cfg(unix)]
fn poll_readable(fd: c_int, timeout_ms: i32) -> bool {
    let mut fds = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let result = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
    result > 0 && (fds.revents & libc::POLLIN) != 0
}

#[cfg(unix)]
fn get_termios(fd: c_int) -> std::io::Result<libc::termios> {
    let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
    let result = unsafe { libc::tcgetattr(fd, &mut termios) };
    if result != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(termios)
}

#[cfg(unix)]
fn set_termios(fd: c_int, termios: &libc::termios) -> std::io::Result<()> {
    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, termios) };
    if result != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(unix)]
pub struct ProcessTerminal {
    stdin_fd: c_int,
    stdout_fd: c_int,
    original_termios: Option<libc::termios>,
    input_handler: InputHandler,
    resize_handler: ResizeHandler,
    input_thread: Option<JoinHandle<()>>,
    stop_flag: Arc<AtomicBool>,
    drain_mode: Arc<AtomicBool>,
    last_input_time: Arc<AtomicU64>,
    resize_signal_handle: Option<signal_hook::iterator::Handle>,
    resize_thread: Option<JoinHandle<()>>,
    write_failed: bool,
}

#[cfg(unix)]
impl ProcessTerminal {
    pub fn new() -> Self {
        Self {
            stdin_fd: libc::STDIN_FILENO,
            stdout_fd: libc::STDOUT_FILENO,
            original_termios: None,
            input_handler: Arc::new(Mutex::new(None)),
            resize_handler: Arc::new(Mutex::new(None)),
            input_thread: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            drain_mode: Arc::new(AtomicBool::new(false)),
            last_input_time: Arc::new(AtomicU64::new(now_ms())),
            resize_signal_handle: None,
            resize_thread: None,
            write_failed: false,
        }
    }

    fn enable_raw_mode(&mut self) -> std::io::Result<()> {
        let original = match self.original_termios {
            Some(original) => original,
            None => {
                let original = get_termios(self.stdin_fd)?;
                self.original_termios = Some(original);
                let _ = ORIGINAL_TERMIOS.set((self.stdin_fd, original));
                original
            }
        };
        let mut raw = original;
        unsafe {
            libc::cfmakeraw(&mut raw);
        }
        set_termios(self.stdin_fd, &raw)
    }

    fn restore_raw_mode(&mut self) -> std::io::Result<()> {
        if let Some(original) = self.original_termios.as_ref() {
            set_termios(self.stdin_fd, original)?;
        }
        Ok(())
    }

    fn clear_handlers(&self) {
        *lock_unpoisoned(&self.input_handler) = None;
        *lock_unpoisoned(&self.resize_handler) = None;
    }

    fn start_input_thread(&mut self) -> std::io::Result<()> {
        let stdin_fd = self.stdin_fd;
        let input_handler = Arc::clone(&self.input_handler);
        let stop_flag = Arc::clone(&self.stop_flag);
        let drain_mode = Arc::clone(&self.drain_mode);
        let last_input_time = Arc::clone(&self.last_input_time);

        let handle = thread::Builder::new()
            .name("terminal-input".to_string())
            .spawn(move || {
                let mut buffer = [0u8; 4096];
                let mut assembler = InputAssembler::default();

                while !stop_flag.load(Ordering::SeqCst) {
                    if !poll_readable(stdin_fd, INPUT_POLL_MS) {
                        continue;
                    }
                    let read_len =
                        unsafe { libc::read(stdin_fd, buffer.as_mut_ptr() as *mut _, buffer.len()) };
                    if read_len <= 0 {
                        continue;
                    }
                    last_input_time.store(now_ms(), Ordering::SeqCst);
                    let Some(chunk) = assembler.push(&buffer[..read_len as usize]) else {
                        continue;
                    };
                    if drain_mode.load(Ordering::SeqCst) {
                        continue;
                    }
                    if let Some(handler) = lock_unpoisoned(&input_handler).as_mut() {
                        handler(chunk);
                    }
                }
            })?;
        self.input_thread = Some(handle);
        Ok(())
    }

    fn stop_input_thread(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.input_thread.take() {
            let _ = handle.join();
        }
    }

    fn start_resize_thread(&mut self) -> std::io::Result<()> {
        let mut signals = Signals::new([libc::SIGWINCH])?;
        let handle = signals.handle();
        let resize_handler = Arc::clone(&self.resize_handler);

        let thread = thread::Builder::new()
            .name("terminal-resize".to_string())
            .spawn(move || {
                for _ in signals.forever() {
                    if let Some(handler) = lock_unpoisoned(&resize_handler).as_mut() {
                        handler();
                    }
                }
            });
        let thread = match thread {
            Ok(thread) => thread,
            Err(err) => {
                handle.close();
                return Err(err);
            }
        };

        self.resize_signal_handle = Some(handle);
        self.resize_thread = Some(thread);
        Ok(())
    }

    fn stop_resize_thread(&mut self) {
        if let Some(handle) = self.resize_signal_handle.take() {
            handle.close();
        }
        if let Some(thread) = self.resize_thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(unix)]
impl Default for ProcessTerminal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl Terminal for ProcessTerminal {
    fn start(
        &mut self,
        on_input: Box<dyn FnMut(String) + Send>,
        on_resize: Box<dyn FnMut() + Send>,
    ) -> std::io::Result<()> {
        *lock_unpoisoned(&self.input_handler) = Some(on_input);
        *lock_unpoisoned(&self.resize_handler) = Some(on_resize);

        self.stop_flag.store(false, Ordering::SeqCst);
        self.drain_mode.store(false, Ordering::SeqCst);
        self.last_input_time.store(now_ms(), Ordering::SeqCst);

        if let Err(err) = self.enable_raw_mode() {
            self.clear_handlers();
            return Err(err);
        }

        let started = self
            .start_resize_thread()
            .and_then(|()| self.start_input_thread());
        if let Err(err) = started {
            self.stop_resize_thread();
            self.clear_handlers();
            let _ = self.restore_raw_mode();
            return Err(err);
        }
        debug!(
            columns = self.columns(),
            rows = self.rows(),
            "terminal entered raw mode"
        );

        Ok(())
    }

    fn stop(&mut self) -> std::io::Result<()> {
        self.stop_input_thread();
        self.stop_resize_thread();
        self.clear_handlers();

        // Flush input before leaving raw mode to avoid buffered bytes leaking to the shell.
        let _ = unsafe { libc::tcflush(self.stdin_fd, libc::TCIFLUSH) };

        self.restore_raw_mode()
    }

    fn drain_input(&mut self, max_ms: u64, idle_ms: u64) {
        self.drain_mode.store(true, Ordering::SeqCst);
        self.last_input_time.store(now_ms(), Ordering::SeqCst);

        let end_time = now_ms().saturating_add(max_ms);
        loop {
            let now = now_ms();
            if now >= end_time {
                break;
            }
            let last_input = self.last_input_time.load(Ordering::SeqCst);
            if now.saturating_sub(last_input) >= idle_ms {
                break;
            }

            let remaining = end_time.saturating_sub(now);
            let sleep_for = idle_ms.min(remaining).max(1);
            thread::sleep(Duration::from_millis(sleep_for));
        }

        self.drain_mode.store(false, Ordering::SeqCst);
    }

    fn write(&mut self, data: &str) {
        if data.is_empty() || self.write_failed {
            return;
        }
        if let Err(err) = write_fd(self.stdout_fd, data) {
            // Stop after the first failure; the runtime has no way to recover the tty.
            self.write_failed = true;
            error!(error = %err, "terminal write failed");
        }
    }

    fn columns(&self) -> u16 {
        read_winsize(self.stdout_fd)
            .map(|(cols, _)| cols)
            .unwrap_or(80)
    }

    fn rows(&self) -> u16 {
        read_winsize(self.stdout_fd)
            .map(|(_, rows)| rows)
            .unwrap_or(24)
    }
}

/// Install a panic hook that puts the tty back into a usable state before the
/// previous hook prints the panic message.
#[cfg(unix)]
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = write_fd(libc::STDOUT_FILENO, PANIC_RESET);
        if let Some((fd, original)) = ORIGINAL_TERMIOS.get() {
            let _ = set_termios(*fd, original);
        }
        previous(info);
    }));
}

#[cfg(not(unix))]
pub fn install_panic_hook() {}

#[cfg(not(unix))]
pub struct ProcessTerminal;

#[cfg(not(unix))]
impl ProcessTerminal {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(unix))]
impl Default for ProcessTerminal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(unix))]
impl Terminal for ProcessTerminal {
    fn start(
        &mut self,
        _on_input: Box<dyn FnMut(String) + Send>,
        _on_resize: Box<dyn FnMut() + Send>,
    ) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "process terminal requires a unix tty",
        ))
    }

    fn stop(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn drain_input(&mut self, _max_ms: u64, _idle_ms: u64) {}

    fn write(&mut self, _data: &str) {}

    fn columns(&self) -> u16 {
        80
    }

    fn rows(&self) -> u16 {
        24
    }
}


#[cfg(all(test, unix))]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use super::{poll_readable, ProcessTerminal};
    use crate::core::terminal::Terminal;

    use libc::{self, c_int};

    struct Pty {
        master: c_int,
        slave: c_int,
    }

    impl Drop for Pty {
        fn drop(&mut self) {
            unsafe {
                libc::close(self.master);
                libc::close(self.slave);
            }
        }
    }

    fn open_pty() -> Pty {
        let mut master: c_int = 0;
        let mut slave: c_int = 0;
        let result = unsafe {
            libc::openpty(
                &mut master,
                &mut slave,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, 0, "openpty failed");
        Pty { master, slave }
    }

    fn read_available(fd: c_int, timeout: Duration) -> Vec<u8> {
        let end = Instant::now() + timeout;
        let mut out = Vec::new();
        while Instant::now() < end {
            let remaining = end.saturating_duration_since(Instant::now());
            let timeout_ms = remaining.as_millis().min(i32::MAX as u128) as i32;
            if timeout_ms == 0 || !poll_readable(fd, timeout_ms) {
                break;
            }
            let mut buf = [0u8; 1024];
            let read_len = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
            if read_len <= 0 {
                break;
            }
            out.extend_from_slice(&buf[..read_len as usize]);
        }
        out
    }

    fn pty_terminal(pty: &Pty) -> ProcessTerminal {
        let mut terminal = ProcessTerminal::new();
        terminal.stdin_fd = pty.slave;
        terminal.stdout_fd = pty.slave;
        terminal
    }

    #[test]
    fn pty_start_stop_do_not_write_output() {
        let pty = open_pty();
        let mut terminal = pty_terminal(&pty);

        terminal
            .start(Box::new(|_| {}), Box::new(|| {}))
            .expect("terminal start");
        let output = read_available(pty.master, Duration::from_millis(200));
        assert!(output.is_empty(), "start() should write nothing");

        terminal.stop().expect("terminal stop");
        let output = read_available(pty.master, Duration::from_millis(200));
        assert!(output.is_empty(), "stop() should write nothing");
    }

    #[test]
    fn typed_bytes_reach_input_handler() {
        let pty = open_pty();
        let mut terminal = pty_terminal(&pty);
        let received = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&received);

        terminal
            .start(
                Box::new(move |chunk| sink.lock().expect("sink lock").push_str(&chunk)),
                Box::new(|| {}),
            )
            .expect("terminal start");
        let _ = unsafe { libc::write(pty.master, b"ab\r".as_ptr() as *const libc::c_void, 3) };

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline && received.lock().expect("sink lock").len() < 3 {
            std::thread::sleep(Duration::from_millis(5));
        }
        terminal.stop().expect("terminal stop");

        assert_eq!(received.lock().expect("sink lock").as_str(), "ab\r");
    }

    #[test]
    fn drain_input_returns_within_limits() {
        let pty = open_pty();
        let mut terminal = pty_terminal(&pty);

        terminal
            .start(Box::new(|_| {}), Box::new(|| {}))
            .expect("terminal start");

        let start = Instant::now();
        terminal.drain_input(200, 50);
        assert!(start.elapsed() <= Duration::from_millis(300));

        terminal.stop().expect("terminal stop");
    }

    #[test]
    fn write_reaches_the_tty() {
        let pty = open_pty();
        let mut terminal = pty_terminal(&pty);

        terminal.write("frame");
        let output = read_available(pty.master, Duration::from_millis(200));
        assert_eq!(String::from_utf8_lossy(&output), "frame");
    }
}

use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::path::Path;
use std::process::Command;

use log::debug;

use crate::plotter_hal::{HalError, HalResult};

/// Line oriented link to the EiBotBoard firmware.
pub struct EbbConnection {
  reader: Box<dyn BufRead>,
  writer: Box<dyn Write>,
}

impl EbbConnection {
  /// Opens the USB CDC tty at `path`.  The line discipline is put in raw mode first so that the
  /// kernel neither echoes our commands back at the board nor waits for a full line.
  pub fn open(path: &Path) -> HalResult<Self> {
    configure_tty(path)?;
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let reader = BufReader::new(file.try_clone()?);
    Ok(Self::from_parts(Box::new(reader), Box::new(file)))
  }

  pub fn from_parts(reader: Box<dyn BufRead>, writer: Box<dyn Write>) -> Self {
    Self { reader, writer }
  }

  pub fn query_version(&mut self) -> HalResult<String> {
    self.send("V\r")?;
    let version = self.read_line("V")?;
    if !version.contains("EBB") {
      return Err(HalError::Protocol { command: "V".to_owned(), response: version });
    }
    Ok(version)
  }

  /// Sends a single command and requires the firmware to acknowledge it with `OK`.
  pub fn command(&mut self, command: &str) -> HalResult<()> {
    self.send(&format!("{command}\r"))?;
    let response = self.read_line(command)?;
    if response != "OK" {
      return Err(HalError::Protocol { command: command.to_owned(), response });
    }
    Ok(())
  }

  /// Sends a command whose answer is a single data line instead of `OK`.
  pub fn query(&mut self, query: &str) -> HalResult<String> {
    self.send(&format!("{query}\r"))?;
    self.read_line(query)
  }

  /// Writes `text` untouched and collects one response line for each non-empty command in it.
  pub fn raw(&mut self, text: &str) -> HalResult<String> {
    self.send(text)?;
    let expected = text.split(|c| c == '\r' || c == '\n')
        .filter(|part| !part.trim().is_empty())
        .count();
    let mut responses = Vec::with_capacity(expected);
    for _ in 0..expected {
      responses.push(self.read_line(text.trim())?);
    }
    Ok(responses.join("\n"))
  }

  fn send(&mut self, text: &str) -> HalResult<()> {
    debug!("ebb <- {:?}", text);
    self.writer.write_all(text.as_bytes())?;
    self.writer.flush()?;
    Ok(())
  }

  fn read_line(&mut self, command: &str) -> HalResult<String> {
    loop {
      let mut line = String::new();
      let read = self.reader.read_line(&mut line)?;
      if read == 0 {
        return Err(HalError::Io(std::io::Error::new(
          ErrorKind::TimedOut,
          format!("no response to {command:?}"))));
      }
      let trimmed = line.trim();
      if trimmed.is_empty() {
        continue;
      }
      debug!("ebb -> {:?}", trimmed);
      if trimmed.starts_with('!') {
        return Err(HalError::Protocol { command: command.to_owned(), response: trimmed.to_owned() });
      }
      return Ok(trimmed.to_owned());
    }
  }
}

/// `min 0 time 100` makes a read return empty after 10s of silence instead of blocking forever.
/// Without it a silent board would hang the run, so failing here fails the open.
fn configure_tty(path: &Path) -> HalResult<()> {
  let result = Command::new("stty")
      .arg("-F")
      .arg(path)
      .args(["raw", "-echo", "min", "0", "time", "100"])
      .status();
  match result {
    Ok(status) if status.success() => Ok(()),
    Ok(status) => Err(HalError::Io(io::Error::new(
        ErrorKind::Other,
        format!("stty failed on {}: {status}", path.display())))),
    Err(e) => Err(HalError::Io(io::Error::new(
        e.kind(),
        format!("could not run stty: {e}")))),
  }
}

#[cfg(test)]
pub mod tests {
  use std::cell::RefCell;
  use std::io::Cursor;
  use std::rc::Rc;

  use super::*;

  /// Captures everything written to the board.
  #[derive(Clone, Default)]
  pub struct SharedBuffer(pub Rc<RefCell<Vec<u8>>>);

  impl SharedBuffer {
    pub fn contents(&self) -> String {
      String::from_utf8(self.0.borrow().clone()).unwrap()
    }
  }

  impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.0.borrow_mut().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  pub fn scripted_connection(responses: &str) -> (EbbConnection, SharedBuffer) {
    let sent = SharedBuffer::default();
    let connection = EbbConnection::from_parts(
      Box::new(Cursor::new(responses.as_bytes().to_vec())),
      Box::new(sent.clone()));
    (connection, sent)
  }

  #[test]
  fn test_version_check() {
    let (mut connection, sent) =
        scripted_connection("EBBv13_and_above EB Firmware Version 2.8.1\r\n");
    let version = connection.query_version().unwrap();
    assert!(version.ends_with("2.8.1"));
    assert_eq!(sent.contents(), "V\r");
  }

  #[test]
  fn test_version_rejects_other_devices() {
    let (mut connection, _) = scripted_connection("Arduino\r\n");
    assert!(matches!(connection.query_version(), Err(HalError::Protocol { .. })));
  }

  #[test]
  fn test_command_requires_ok() {
    let (mut connection, sent) = scripted_connection("OK\r\n!8 Err: Unknown command\r\n");
    connection.command("EM,1,1").unwrap();
    assert!(matches!(connection.command("XX"), Err(HalError::Protocol { .. })));
    assert_eq!(sent.contents(), "EM,1,1\rXX\r");
  }

  #[test]
  fn test_raw_reads_one_line_per_command() {
    let (mut connection, sent) = scripted_connection("OK\r\nOK\r\n");
    let response = connection.raw("S2,11650,6\r\r").unwrap();
    assert_eq!(response, "OK");
    assert_eq!(sent.contents(), "S2,11650,6\r\r");

    let response = connection.raw("SP,1\r").unwrap();
    assert_eq!(response, "OK");
  }

  #[test]
  fn test_silence_is_an_error() {
    let (mut connection, _) = scripted_connection("");
    assert!(matches!(connection.command("EM,0,0"), Err(HalError::Io(_))));
  }

  #[test]
  fn test_open_fails_when_tty_cannot_be_configured() {
    let missing = std::env::temp_dir().join(format!("no-such-tty-{}", std::process::id()));
    assert!(matches!(EbbConnection::open(&missing), Err(HalError::Io(_))));
  }
}

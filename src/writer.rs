use std::{fs::File, io::BufWriter, path::Path, sync::mpsc::Receiver};

use log::warn;
use serde_jsonlines::JsonLinesWriter;

use crate::{DispatchError, dispatch::DispatchEvent};

/// Append every event received to `file` as JSON lines until the sender hangs up.
pub fn write_events(
    file: &Path,
    event_receiver: Receiver<DispatchEvent>,
) -> Result<usize, DispatchError> {
    let event_file = File::create(file).map_err(|e| DispatchError::WriterError { source: e })?;
    let mut writer = JsonLinesWriter::new(BufWriter::new(event_file));
    let mut written = 0;
    for event in &event_receiver {
        match writer.write(&event) {
            Ok(()) => written += 1,
            Err(e) => warn!("Error while writing dispatch event to output file: {}", e),
        }
    }
    writer
        .flush()
        .map_err(|e| DispatchError::WriterError { source: e })?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tempfile::TempDir;

    #[test]
    fn test_events_written_as_json_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.jsonl");

        let (sender, receiver) = mpsc::channel();
        sender.send(DispatchEvent::Arrived { session_id: 1 }).unwrap();
        sender
            .send(DispatchEvent::Reset { session_id: 1 })
            .unwrap();
        drop(sender);

        assert_eq!(write_events(&path, receiver).unwrap(), 2);

        let events: Vec<DispatchEvent> = serde_jsonlines::json_lines(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            events,
            vec![
                DispatchEvent::Arrived { session_id: 1 },
                DispatchEvent::Reset { session_id: 1 }
            ]
        );
    }
}

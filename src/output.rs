//! Event line formatting
//!
//! Every event, including acknowledgements and unknown kinds, becomes exactly
//! one line.

use std::io::{self, Write};

use crate::codec::ProcessEvent;
use crate::config::OutputFormat;

/// Render an event as one human-readable line (without newline)
pub fn format_text(event: &ProcessEvent) -> String {
    match event {
        ProcessEvent::Fork {
            parent_thread_id,
            parent_process_id,
            child_thread_id,
            child_process_id,
        } => format!(
            "fork: parent tid={} pid={} -> child tid={} pid={}",
            parent_thread_id, parent_process_id, child_thread_id, child_process_id
        ),
        ProcessEvent::Exec {
            thread_id,
            process_id,
        } => format!("exec: tid={} pid={}", thread_id, process_id),
        ProcessEvent::UidChange {
            thread_id,
            process_id,
            real_uid,
            effective_uid,
        } => format!(
            "uid change: tid={} pid={} from {} to {}",
            thread_id, process_id, real_uid, effective_uid
        ),
        ProcessEvent::GidChange {
            thread_id,
            process_id,
            real_gid,
            effective_gid,
        } => format!(
            "gid change: tid={} pid={} from {} to {}",
            thread_id, process_id, real_gid, effective_gid
        ),
        ProcessEvent::SessionChange {
            thread_id,
            process_id,
        } => format!("sid change: tid={} pid={}", thread_id, process_id),
        ProcessEvent::Ptrace {
            thread_id,
            process_id,
            tracer_thread_id,
            tracer_process_id,
        } => format!(
            "ptrace: tid={} pid={} tracer tid={} pid={}",
            thread_id, process_id, tracer_thread_id, tracer_process_id
        ),
        ProcessEvent::CommChange {
            thread_id,
            process_id,
            comm,
        } => format!("comm: tid={} pid={} comm={:?}", thread_id, process_id, comm),
        ProcessEvent::Coredump {
            thread_id,
            process_id,
        } => format!("coredump: tid={} pid={}", thread_id, process_id),
        ProcessEvent::Exit {
            thread_id,
            process_id,
            exit_code,
            exit_signal,
        } => format!(
            "exit: tid={} pid={} exit_code={} exit_signal={}",
            thread_id, process_id, exit_code, exit_signal
        ),
        ProcessEvent::ConnectionAck => "listen ack: subscription active".to_string(),
        ProcessEvent::Unknown { kind } => format!("unhandled proc event: kind=0x{:08x}", kind),
    }
}

/// Render an event as one JSON object (without newline)
pub fn format_json(event: &ProcessEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}

/// Writes one line per event in the selected format
pub struct EventWriter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> EventWriter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    /// Write and flush one event line
    pub fn write_event(&mut self, event: &ProcessEvent) -> io::Result<()> {
        let line = match self.format {
            OutputFormat::Text => format_text(event),
            OutputFormat::Json => format_json(event)?,
        };
        writeln!(self.out, "{}", line)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_kinds() -> Vec<ProcessEvent> {
        vec![
            ProcessEvent::Fork {
                parent_thread_id: 100,
                parent_process_id: 100,
                child_thread_id: 200,
                child_process_id: 200,
            },
            ProcessEvent::Exec {
                thread_id: 1,
                process_id: 1,
            },
            ProcessEvent::UidChange {
                thread_id: 2,
                process_id: 2,
                real_uid: 1000,
                effective_uid: 0,
            },
            ProcessEvent::GidChange {
                thread_id: 3,
                process_id: 3,
                real_gid: 1000,
                effective_gid: 0,
            },
            ProcessEvent::SessionChange {
                thread_id: 4,
                process_id: 4,
            },
            ProcessEvent::Ptrace {
                thread_id: 5,
                process_id: 5,
                tracer_thread_id: 6,
                tracer_process_id: 6,
            },
            ProcessEvent::CommChange {
                thread_id: 7,
                process_id: 7,
                comm: "evil\nname".to_string(),
            },
            ProcessEvent::Coredump {
                thread_id: 8,
                process_id: 8,
            },
            ProcessEvent::Exit {
                thread_id: 50,
                process_id: 50,
                exit_code: 9,
                exit_signal: 17,
            },
            ProcessEvent::ConnectionAck,
            ProcessEvent::Unknown { kind: 0x400 },
        ]
    }

    #[test]
    fn test_format_text_fork() {
        let line = format_text(&all_kinds()[0]);
        assert_eq!(line, "fork: parent tid=100 pid=100 -> child tid=200 pid=200");
    }

    #[test]
    fn test_format_text_exit() {
        let line = format_text(&all_kinds()[8]);
        assert_eq!(line, "exit: tid=50 pid=50 exit_code=9 exit_signal=17");
    }

    #[test]
    fn test_format_text_unknown() {
        let line = format_text(&ProcessEvent::Unknown { kind: 0x400 });
        assert_eq!(line, "unhandled proc event: kind=0x00000400");
    }

    #[test]
    fn test_format_json_tags_event() {
        let json = format_json(&all_kinds()[1]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "exec");
        assert_eq!(value["thread_id"], 1);
        assert_eq!(value["process_id"], 1);
    }

    #[test]
    fn test_format_json_ack() {
        let json = format_json(&ProcessEvent::ConnectionAck).unwrap();
        assert_eq!(json, r#"{"event":"connection_ack"}"#);
    }

    #[test]
    fn test_every_kind_is_exactly_one_line() {
        for format in [OutputFormat::Text, OutputFormat::Json] {
            let mut writer = EventWriter::new(Vec::new(), format);
            for event in all_kinds() {
                writer.write_event(&event).unwrap();
            }
            let out = String::from_utf8(writer.into_inner()).unwrap();
            assert_eq!(out.lines().count(), all_kinds().len(), "{:?}", format);
            assert!(out.lines().all(|line| !line.is_empty()));
        }
    }
}

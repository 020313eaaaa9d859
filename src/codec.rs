//! Wire codec for the proc connector
//!
//! The kernel ABI is described as a byte-offset schema rather than with
//! `#[repr(C)]` structs: every field has a fixed offset and width inside the
//! frame, and all integers are in host byte order. A frame is a netlink
//! header, a tightly packed connector header, and either a 4-byte control
//! code (subscription) or a `proc_event` (notification).

use serde::Serialize;

use crate::error::DecodeError;

/// Netlink message alignment (`NLMSG_ALIGNTO`)
pub const NLMSG_ALIGNTO: usize = 4;
/// Netlink "end of multipart" message type used by the connector
pub const NLMSG_DONE: u16 = 3;
/// Connector index of the process event facility, also its multicast group
pub const CN_IDX_PROC: u32 = 1;
/// Connector value of the process event facility
pub const CN_VAL_PROC: u32 = 1;

/// Kernel `proc_cn_mcast_op` values
pub const PROC_CN_MCAST_LISTEN: u32 = 1;
pub const PROC_CN_MCAST_IGNORE: u32 = 2;

/// Kernel `proc_event.what` tags
pub mod kind {
    pub const NONE: u32 = 0x0000_0000;
    pub const FORK: u32 = 0x0000_0001;
    pub const EXEC: u32 = 0x0000_0002;
    pub const UID: u32 = 0x0000_0004;
    pub const GID: u32 = 0x0000_0040;
    pub const SID: u32 = 0x0000_0080;
    pub const PTRACE: u32 = 0x0000_0100;
    pub const COMM: u32 = 0x0000_0200;
    pub const COREDUMP: u32 = 0x4000_0000;
    pub const EXIT: u32 = 0x8000_0000;
}

/// One fixed-width field of the kernel layout
///
/// `name` is the kernel's field name and shows up in decode errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
}

impl Field {
    const fn new(name: &'static str, offset: usize, width: usize) -> Self {
        Self {
            name,
            offset,
            width,
        }
    }

    /// First byte past this field
    pub const fn end(&self) -> usize {
        self.offset + self.width
    }

    fn read_u32(&self, buf: &[u8]) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&buf[self.offset..self.offset + 4]);
        u32::from_ne_bytes(raw)
    }

    fn write_u32(&self, buf: &mut [u8], value: u32) {
        buf[self.offset..self.offset + 4].copy_from_slice(&value.to_ne_bytes());
    }

    fn write_u16(&self, buf: &mut [u8], value: u16) {
        buf[self.offset..self.offset + 2].copy_from_slice(&value.to_ne_bytes());
    }

    fn bytes<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.offset..self.end()]
    }
}

/// Byte-offset schema of the frames exchanged with the kernel
pub mod layout {
    use super::Field;

    // struct nlmsghdr
    pub const NLMSG_LEN: Field = Field::new("nlmsg_len", 0, 4);
    pub const NLMSG_TYPE: Field = Field::new("nlmsg_type", 4, 2);
    pub const NLMSG_FLAGS: Field = Field::new("nlmsg_flags", 6, 2);
    pub const NLMSG_SEQ: Field = Field::new("nlmsg_seq", 8, 4);
    pub const NLMSG_PID: Field = Field::new("nlmsg_pid", 12, 4);
    pub const NLMSG_HDR_LEN: usize = 16;

    // struct cn_msg, packed directly after the netlink header
    pub const CN_IDX: Field = Field::new("cn_id.idx", 16, 4);
    pub const CN_VAL: Field = Field::new("cn_id.val", 20, 4);
    pub const CN_SEQ: Field = Field::new("cn_seq", 24, 4);
    pub const CN_ACK: Field = Field::new("cn_ack", 28, 4);
    pub const CN_LEN: Field = Field::new("cn_len", 32, 2);
    pub const CN_FLAGS: Field = Field::new("cn_flags", 34, 2);
    pub const CN_DATA_OFFSET: usize = 36;

    // subscription payload
    pub const MCAST_OP: Field = Field::new("mcast_op", 36, 4);
    pub const SUBSCRIBE_LEN: usize = 40;

    // struct proc_event header
    pub const EVENT_KIND: Field = Field::new("what", 36, 4);
    pub const EVENT_CPU: Field = Field::new("cpu", 40, 4);
    pub const EVENT_TIMESTAMP: Field = Field::new("timestamp_ns", 44, 8);
    pub const EVENT_DATA_OFFSET: usize = 52;
    /// Size of the `event_data` union
    pub const EVENT_DATA_LEN: usize = 24;
    /// Size of `struct proc_event`
    pub const PROC_EVENT_LEN: usize = EVENT_DATA_OFFSET + EVENT_DATA_LEN - CN_DATA_OFFSET;
    /// Size of a complete notification frame
    pub const EVENT_FRAME_LEN: usize = EVENT_DATA_OFFSET + EVENT_DATA_LEN;

    /// The `index`-th 32-bit word of `event_data`
    pub const fn data_word(index: usize) -> Field {
        Field::new("event_data", EVENT_DATA_OFFSET + index * 4, 4)
    }

    /// `comm` array of `comm_proc_event`
    pub const COMM: Field = Field::new("comm", EVENT_DATA_OFFSET + 8, 16);
}

const _: () = assert!(layout::SUBSCRIBE_LEN % NLMSG_ALIGNTO == 0);
const _: () = assert!(layout::EVENT_FRAME_LEN % NLMSG_ALIGNTO == 0);

/// One decoded process event
///
/// `process_id` is the kernel's thread group id (tgid) and `thread_id` is the
/// kernel's per-task pid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProcessEvent {
    Fork {
        parent_thread_id: u32,
        parent_process_id: u32,
        child_thread_id: u32,
        child_process_id: u32,
    },
    Exec {
        thread_id: u32,
        process_id: u32,
    },
    UidChange {
        thread_id: u32,
        process_id: u32,
        real_uid: u32,
        effective_uid: u32,
    },
    GidChange {
        thread_id: u32,
        process_id: u32,
        real_gid: u32,
        effective_gid: u32,
    },
    SessionChange {
        thread_id: u32,
        process_id: u32,
    },
    Ptrace {
        thread_id: u32,
        process_id: u32,
        tracer_thread_id: u32,
        tracer_process_id: u32,
    },
    CommChange {
        thread_id: u32,
        process_id: u32,
        comm: String,
    },
    Coredump {
        thread_id: u32,
        process_id: u32,
    },
    Exit {
        thread_id: u32,
        process_id: u32,
        exit_code: u32,
        exit_signal: u32,
    },
    /// The kernel accepted the subscription
    ConnectionAck,
    /// A kind this decoder does not know
    Unknown {
        kind: u32,
    },
}

impl ProcessEvent {
    /// Kernel `what` tag for this event
    pub fn kind(&self) -> u32 {
        match self {
            ProcessEvent::Fork { .. } => kind::FORK,
            ProcessEvent::Exec { .. } => kind::EXEC,
            ProcessEvent::UidChange { .. } => kind::UID,
            ProcessEvent::GidChange { .. } => kind::GID,
            ProcessEvent::SessionChange { .. } => kind::SID,
            ProcessEvent::Ptrace { .. } => kind::PTRACE,
            ProcessEvent::CommChange { .. } => kind::COMM,
            ProcessEvent::Coredump { .. } => kind::COREDUMP,
            ProcessEvent::Exit { .. } => kind::EXIT,
            ProcessEvent::ConnectionAck => kind::NONE,
            ProcessEvent::Unknown { kind } => *kind,
        }
    }
}

/// Build the LISTEN (`enable`) or IGNORE control message sent by `pid`
pub fn encode_subscribe(enable: bool, pid: u32) -> [u8; layout::SUBSCRIBE_LEN] {
    let mut msg = [0u8; layout::SUBSCRIBE_LEN];

    layout::NLMSG_LEN.write_u32(&mut msg, layout::SUBSCRIBE_LEN as u32);
    layout::NLMSG_TYPE.write_u16(&mut msg, NLMSG_DONE);
    layout::NLMSG_FLAGS.write_u16(&mut msg, 0);
    layout::NLMSG_SEQ.write_u32(&mut msg, 0);
    layout::NLMSG_PID.write_u32(&mut msg, pid);

    layout::CN_IDX.write_u32(&mut msg, CN_IDX_PROC);
    layout::CN_VAL.write_u32(&mut msg, CN_VAL_PROC);
    layout::CN_SEQ.write_u32(&mut msg, 0);
    layout::CN_ACK.write_u32(&mut msg, 0);
    layout::CN_LEN.write_u16(&mut msg, layout::MCAST_OP.width as u16);
    layout::CN_FLAGS.write_u16(&mut msg, 0);

    let op = if enable {
        PROC_CN_MCAST_LISTEN
    } else {
        PROC_CN_MCAST_IGNORE
    };
    layout::MCAST_OP.write_u32(&mut msg, op);

    msg
}

/// Decode one received frame
///
/// Only the `nlmsg_len` prefix of `frame` is considered, and within it only
/// the bytes the event kind needs. Unrecognized kinds decode to
/// [`ProcessEvent::Unknown`].
pub fn decode_event(frame: &[u8]) -> Result<ProcessEvent, DecodeError> {
    require(frame, layout::EVENT_KIND)?;

    let declared = layout::NLMSG_LEN.read_u32(frame) as usize;
    if declared < layout::EVENT_KIND.end() || declared > frame.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: frame.len(),
        });
    }
    let frame = &frame[..declared];

    let idx = layout::CN_IDX.read_u32(frame);
    let val = layout::CN_VAL.read_u32(frame);
    if idx != CN_IDX_PROC || val != CN_VAL_PROC {
        return Err(DecodeError::ForeignChannel { idx, val });
    }

    let what = layout::EVENT_KIND.read_u32(frame);
    let Some(last) = last_field(what) else {
        return Ok(ProcessEvent::Unknown { kind: what });
    };
    require(frame, last)?;
    let word = |index: usize| layout::data_word(index).read_u32(frame);

    let event = match what {
        kind::NONE => ProcessEvent::ConnectionAck,
        kind::FORK => ProcessEvent::Fork {
            parent_thread_id: word(0),
            parent_process_id: word(1),
            child_thread_id: word(2),
            child_process_id: word(3),
        },
        kind::EXEC => ProcessEvent::Exec {
            thread_id: word(0),
            process_id: word(1),
        },
        kind::UID => ProcessEvent::UidChange {
            thread_id: word(0),
            process_id: word(1),
            real_uid: word(2),
            effective_uid: word(3),
        },
        kind::GID => ProcessEvent::GidChange {
            thread_id: word(0),
            process_id: word(1),
            real_gid: word(2),
            effective_gid: word(3),
        },
        kind::SID => ProcessEvent::SessionChange {
            thread_id: word(0),
            process_id: word(1),
        },
        kind::PTRACE => ProcessEvent::Ptrace {
            thread_id: word(0),
            process_id: word(1),
            tracer_thread_id: word(2),
            tracer_process_id: word(3),
        },
        kind::COMM => ProcessEvent::CommChange {
            thread_id: word(0),
            process_id: word(1),
            comm: decode_comm(layout::COMM.bytes(frame)),
        },
        kind::COREDUMP => ProcessEvent::Coredump {
            thread_id: word(0),
            process_id: word(1),
        },
        kind::EXIT => ProcessEvent::Exit {
            thread_id: word(0),
            process_id: word(1),
            exit_code: word(2),
            exit_signal: word(3),
        },
        other => ProcessEvent::Unknown { kind: other },
    };

    Ok(event)
}

/// Build a frame the way the kernel lays out a notification
///
/// The union is always padded to its full size, as in real datagrams.
pub fn encode_event(event: &ProcessEvent) -> Vec<u8> {
    let mut frame = vec![0u8; layout::EVENT_FRAME_LEN];

    layout::NLMSG_LEN.write_u32(&mut frame, layout::EVENT_FRAME_LEN as u32);
    layout::NLMSG_TYPE.write_u16(&mut frame, NLMSG_DONE);
    layout::CN_IDX.write_u32(&mut frame, CN_IDX_PROC);
    layout::CN_VAL.write_u32(&mut frame, CN_VAL_PROC);
    layout::CN_LEN.write_u16(&mut frame, layout::PROC_EVENT_LEN as u16);
    layout::EVENT_KIND.write_u32(&mut frame, event.kind());

    let words: Vec<u32> = match event {
        ProcessEvent::Fork {
            parent_thread_id,
            parent_process_id,
            child_thread_id,
            child_process_id,
        } => vec![
            *parent_thread_id,
            *parent_process_id,
            *child_thread_id,
            *child_process_id,
        ],
        ProcessEvent::Exec {
            thread_id,
            process_id,
        }
        | ProcessEvent::SessionChange {
            thread_id,
            process_id,
        }
        | ProcessEvent::Coredump {
            thread_id,
            process_id,
        }
        | ProcessEvent::CommChange {
            thread_id,
            process_id,
            ..
        } => vec![*thread_id, *process_id],
        ProcessEvent::UidChange {
            thread_id,
            process_id,
            real_uid: real,
            effective_uid: effective,
        }
        | ProcessEvent::GidChange {
            thread_id,
            process_id,
            real_gid: real,
            effective_gid: effective,
        } => vec![*thread_id, *process_id, *real, *effective],
        ProcessEvent::Ptrace {
            thread_id,
            process_id,
            tracer_thread_id,
            tracer_process_id,
        } => vec![
            *thread_id,
            *process_id,
            *tracer_thread_id,
            *tracer_process_id,
        ],
        ProcessEvent::Exit {
            thread_id,
            process_id,
            exit_code,
            exit_signal,
        } => vec![*thread_id, *process_id, *exit_code, *exit_signal],
        ProcessEvent::ConnectionAck | ProcessEvent::Unknown { .. } => Vec::new(),
    };
    for (index, value) in words.into_iter().enumerate() {
        layout::data_word(index).write_u32(&mut frame, value);
    }

    if let ProcessEvent::CommChange { comm, .. } = event {
        // keep room for the terminating NUL
        let name = comm.as_bytes();
        let len = name.len().min(layout::COMM.width - 1);
        let start = layout::COMM.offset;
        frame[start..start + len].copy_from_slice(&name[..len]);
    }

    frame
}

/// Last field a known kind reads; the frame must reach its end
fn last_field(what: u32) -> Option<Field> {
    match what {
        kind::NONE => Some(layout::EVENT_TIMESTAMP),
        kind::EXEC | kind::SID | kind::COREDUMP => Some(layout::data_word(1)),
        kind::FORK | kind::UID | kind::GID | kind::PTRACE | kind::EXIT => {
            Some(layout::data_word(3))
        }
        kind::COMM => Some(layout::COMM),
        _ => None,
    }
}

fn decode_comm(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn require(frame: &[u8], field: Field) -> Result<(), DecodeError> {
    if frame.len() < field.end() {
        Err(DecodeError::Truncated {
            field: field.name,
            needed: field.end(),
            actual: frame.len(),
        })
    } else {
        Ok(())
    }
}

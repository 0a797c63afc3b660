// SPDX-License-Identifier: Apache-2.0

//! Protocol constants, enumerations and bitmaps.

use bitflags::bitflags;

/// Default number of bytes of a table-miss packet forwarded to the
/// controller.
pub const DEFAULT_MISS_SEND_LEN: u16 = 128;

/// Sentinel buffer id meaning "packet not buffered, full payload attached".
pub const NO_BUFFER: u32 = 0xffff_ffff;

/// Maximum length of a port name on the wire, terminator included.
pub const MAX_PORT_NAME_LEN: usize = 16;

/// Length of the description strings in a description-stats reply.
pub const DESC_STR_LEN: usize = 256;

/// Length of the serial-number string in a description-stats reply.
pub const SERIAL_NUM_LEN: usize = 32;

/// Table-id sentinel selecting every table of the pipeline.
pub const TABLE_ALL: u8 = 0xff;

/// Table-id sentinel selecting the emergency table.
pub const TABLE_EMERG: u8 = 0xfe;

/// OpenFlow message types.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    Hello = 0,
    Error = 1,
    EchoRequest = 2,
    EchoReply = 3,
    Vendor = 4,
    FeaturesRequest = 5,
    FeaturesReply = 6,
    GetConfigRequest = 7,
    GetConfigReply = 8,
    SetConfig = 9,
    PacketIn = 10,
    FlowRemoved = 11,
    PortStatus = 12,
    PacketOut = 13,
    FlowMod = 14,
    PortMod = 15,
    StatsRequest = 16,
    StatsReply = 17,
    BarrierRequest = 18,
    BarrierReply = 19,
    QueueGetConfigRequest = 20,
    QueueGetConfigReply = 21,
}

impl MsgType {
    /// Interprets a raw header type byte. Unknown values stay raw so the
    /// dispatcher can pass them through to the pipeline untouched.
    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        use MsgType::*;
        Some(match raw {
            0 => Hello,
            1 => Error,
            2 => EchoRequest,
            3 => EchoReply,
            4 => Vendor,
            5 => FeaturesRequest,
            6 => FeaturesReply,
            7 => GetConfigRequest,
            8 => GetConfigReply,
            9 => SetConfig,
            10 => PacketIn,
            11 => FlowRemoved,
            12 => PortStatus,
            13 => PacketOut,
            14 => FlowMod,
            15 => PortMod,
            16 => StatsRequest,
            17 => StatsReply,
            18 => BarrierRequest,
            19 => BarrierReply,
            20 => QueueGetConfigRequest,
            21 => QueueGetConfigReply,
            _ => return None,
        })
    }
}

/// A 16-bit port number, including the reserved values above
/// [`PortNo::MAX`].
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct PortNo(pub u16);

impl PortNo {
    /// Highest assignable physical port number.
    pub const MAX: PortNo = PortNo(0xff00);
    /// Transmit on the port the packet arrived on.
    pub const IN_PORT: PortNo = PortNo(0xfff8);
    /// Re-submit to the flow pipeline (packet-out only).
    pub const TABLE: PortNo = PortNo(0xfff9);
    /// Legacy L2 processing; not implemented by this datapath.
    pub const NORMAL: PortNo = PortNo(0xfffa);
    /// All ports except ingress and those configured NO_FLOOD.
    pub const FLOOD: PortNo = PortNo(0xfffb);
    /// All ports except ingress.
    pub const ALL: PortNo = PortNo(0xfffc);
    /// Escalate to the controller.
    pub const CONTROLLER: PortNo = PortNo(0xfffd);
    /// The datapath's own virtual interface.
    pub const LOCAL: PortNo = PortNo(0xfffe);
    /// Wildcard / "no port".
    pub const NONE: PortNo = PortNo(0xffff);

    /// True for plain numeric port numbers below the reserved range.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        self < Self::MAX
    }
}

impl From<u16> for PortNo {
    fn from(raw: u16) -> Self {
        PortNo(raw)
    }
}

impl From<PortNo> for u16 {
    fn from(p: PortNo) -> u16 {
        p.0
    }
}

impl std::fmt::Display for PortNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::IN_PORT => write!(f, "in_port"),
            Self::TABLE => write!(f, "table"),
            Self::NORMAL => write!(f, "normal"),
            Self::FLOOD => write!(f, "flood"),
            Self::ALL => write!(f, "all"),
            Self::CONTROLLER => write!(f, "controller"),
            Self::LOCAL => write!(f, "local"),
            Self::NONE => write!(f, "none"),
            PortNo(n) => write!(f, "{n}"),
        }
    }
}

bitflags! {
    /// Port administrative configuration bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PortConfig: u32 {
        const PORT_DOWN    = 1 << 0;
        const NO_STP       = 1 << 1;
        const NO_RECV      = 1 << 2;
        const NO_RECV_STP  = 1 << 3;
        const NO_FLOOD     = 1 << 4;
        const NO_FWD       = 1 << 5;
        const NO_PACKET_IN = 1 << 6;
    }

    /// Port observed state bits. The STP sub-field occupies bits 8..10 and
    /// is always zero here (no spanning tree).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PortState: u32 {
        const LINK_DOWN = 1 << 0;
    }

    /// Port speed/media feature bits (curr / advertised / supported / peer).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PortFeatures: u32 {
        const SPEED_10MB_HD  = 1 << 0;
        const SPEED_10MB_FD  = 1 << 1;
        const SPEED_100MB_HD = 1 << 2;
        const SPEED_100MB_FD = 1 << 3;
        const SPEED_1GB_HD   = 1 << 4;
        const SPEED_1GB_FD   = 1 << 5;
        const SPEED_10GB_FD  = 1 << 6;
        const COPPER         = 1 << 7;
        const FIBER          = 1 << 8;
        const AUTONEG        = 1 << 9;
        const PAUSE          = 1 << 10;
        const PAUSE_ASYM     = 1 << 11;
    }

    /// Switch capability bits advertised in features replies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capabilities: u32 {
        const FLOW_STATS   = 1 << 0;
        const TABLE_STATS  = 1 << 1;
        const PORT_STATS   = 1 << 2;
        const STP          = 1 << 3;
        const IP_REASM     = 1 << 5;
        const QUEUE_STATS  = 1 << 6;
        const ARP_MATCH_IP = 1 << 7;
    }

    /// Switch-config fragment-handling flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ConfigFlags: u16 {
        const FRAG_DROP  = 1 << 0;
        const FRAG_REASM = 1 << 1;
    }

    /// Flow-mod flags; only the bits the core inspects on removal records.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FlowModFlags: u16 {
        const SEND_FLOW_REM = 1 << 0;
        const CHECK_OVERLAP = 1 << 1;
        const EMERG         = 1 << 2;
    }
}

/// Capabilities this datapath reports.
pub const SUPPORTED_CAPABILITIES: Capabilities = Capabilities::FLOW_STATS
    .union(Capabilities::TABLE_STATS)
    .union(Capabilities::PORT_STATS)
    .union(Capabilities::ARP_MATCH_IP);

/// Action-type bitmap this datapath reports: OUTPUT through SET_TP_DST.
pub const SUPPORTED_ACTIONS: u32 = (1 << 11) - 1;

/// Why a packet was escalated to the controller.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketInReason {
    /// No flow matched the packet.
    NoMatch = 0,
    /// A matched flow's action list named the controller.
    Action = 1,
}

/// Why a flow left its table.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowRemovedReason {
    IdleTimeout = 0,
    HardTimeout = 1,
    Delete = 2,
}

/// What happened to a port.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortReason {
    Add = 0,
    Delete = 1,
    Modify = 2,
}

/// High-order half of an error message.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    HelloFailed = 0,
    BadRequest = 1,
    BadAction = 2,
    FlowModFailed = 3,
    PortModFailed = 4,
    QueueOpFailed = 5,
}

/// Codes under [`ErrorType::HelloFailed`].
pub mod hello_failed {
    pub const INCOMPATIBLE: u16 = 0;
    pub const EPERM: u16 = 1;
}

/// Codes under [`ErrorType::BadRequest`].
pub mod bad_request {
    pub const BAD_VERSION: u16 = 0;
    pub const BAD_TYPE: u16 = 1;
    pub const BAD_STAT: u16 = 2;
    pub const BAD_VENDOR: u16 = 3;
    pub const BAD_SUBTYPE: u16 = 4;
    pub const EPERM: u16 = 5;
    pub const BAD_LEN: u16 = 6;
    pub const BUFFER_EMPTY: u16 = 7;
    pub const BUFFER_UNKNOWN: u16 = 8;
}

/// Codes under [`ErrorType::PortModFailed`].
pub mod port_mod_failed {
    pub const BAD_PORT: u16 = 0;
    pub const BAD_HW_ADDR: u16 = 1;
}

/// Statistics request/reply kinds.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatsType {
    Desc = 0,
    Flow = 1,
    Aggregate = 2,
    Table = 3,
    Port = 4,
    Queue = 5,
    Vendor = 0xffff,
}

impl StatsType {
    #[must_use]
    pub fn from_raw(raw: u16) -> Option<Self> {
        use StatsType::*;
        Some(match raw {
            0 => Desc,
            1 => Flow,
            2 => Aggregate,
            3 => Table,
            4 => Port,
            5 => Queue,
            0xffff => Vendor,
            _ => return None,
        })
    }
}

/// Reply flag: more fragments follow.
pub const STATS_REPLY_MORE: u16 = 1 << 0;

//! Tuple material data model.
//!
//! The entities here describe offline-produced MPC material without ever
//! touching the payload bytes: chunks identify a batch, fragments track which
//! half-open index ranges of a chunk are still available, and reservations
//! name the ranges withheld for one specific request.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Algebraic field the shares of a tuple live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Field {
    /// Prime-order field.
    Gfp,
    /// Binary extension field GF(2^n).
    Gf2n,
}

impl Field {
    /// Size of one field element in bytes.
    pub const fn element_size(self) -> usize {
        match self {
            Self::Gfp => 16,
            Self::Gf2n => 8,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gfp => write!(f, "GFP"),
            Self::Gf2n => write!(f, "GF2N"),
        }
    }
}

/// The closed set of tuple kinds served by the store.
///
/// The set is fixed at build time. Variant order defines the total order used
/// wherever tuple types are sorted, and the string tag (e.g.
/// `MULTIPLICATION_TRIPLE_GFP`) is the stable wire and cache-key encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TupleType {
    BitGfp,
    BitGf2n,
    InputMaskGfp,
    InputMaskGf2n,
    InverseTupleGfp,
    InverseTupleGf2n,
    SquareTupleGfp,
    SquareTupleGf2n,
    MultiplicationTripleGfp,
    MultiplicationTripleGf2n,
}

impl TupleType {
    /// All tuple types in their canonical order.
    pub const ALL: [TupleType; 10] = [
        Self::BitGfp,
        Self::BitGf2n,
        Self::InputMaskGfp,
        Self::InputMaskGf2n,
        Self::InverseTupleGfp,
        Self::InverseTupleGf2n,
        Self::SquareTupleGfp,
        Self::SquareTupleGf2n,
        Self::MultiplicationTripleGfp,
        Self::MultiplicationTripleGf2n,
    ];

    /// Field the tuple's shares live in.
    pub const fn field(self) -> Field {
        match self {
            Self::BitGfp
            | Self::InputMaskGfp
            | Self::InverseTupleGfp
            | Self::SquareTupleGfp
            | Self::MultiplicationTripleGfp => Field::Gfp,
            Self::BitGf2n
            | Self::InputMaskGf2n
            | Self::InverseTupleGf2n
            | Self::SquareTupleGf2n
            | Self::MultiplicationTripleGf2n => Field::Gf2n,
        }
    }

    /// Number of shares forming one tuple of this type.
    pub const fn arity(self) -> usize {
        match self {
            Self::BitGfp | Self::BitGf2n | Self::InputMaskGfp | Self::InputMaskGf2n => 1,
            Self::InverseTupleGfp
            | Self::InverseTupleGf2n
            | Self::SquareTupleGfp
            | Self::SquareTupleGf2n => 2,
            Self::MultiplicationTripleGfp | Self::MultiplicationTripleGf2n => 3,
        }
    }

    /// Size of one share in bytes (value plus MAC, one field element each).
    pub const fn share_size(self) -> usize {
        self.field().element_size() * 2
    }

    /// Size of one full tuple in bytes.
    pub const fn tuple_size(self) -> usize {
        self.arity() * self.share_size()
    }
}

impl std::fmt::Display for TupleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::BitGfp => "BIT_GFP",
            Self::BitGf2n => "BIT_GF2N",
            Self::InputMaskGfp => "INPUT_MASK_GFP",
            Self::InputMaskGf2n => "INPUT_MASK_GF2N",
            Self::InverseTupleGfp => "INVERSE_TUPLE_GFP",
            Self::InverseTupleGf2n => "INVERSE_TUPLE_GF2N",
            Self::SquareTupleGfp => "SQUARE_TUPLE_GFP",
            Self::SquareTupleGf2n => "SQUARE_TUPLE_GF2N",
            Self::MultiplicationTripleGfp => "MULTIPLICATION_TRIPLE_GFP",
            Self::MultiplicationTripleGf2n => "MULTIPLICATION_TRIPLE_GF2N",
        };
        write!(f, "{}", tag)
    }
}

impl std::str::FromStr for TupleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BIT_GFP" => Ok(Self::BitGfp),
            "BIT_GF2N" => Ok(Self::BitGf2n),
            "INPUT_MASK_GFP" => Ok(Self::InputMaskGfp),
            "INPUT_MASK_GF2N" => Ok(Self::InputMaskGf2n),
            "INVERSE_TUPLE_GFP" => Ok(Self::InverseTupleGfp),
            "INVERSE_TUPLE_GF2N" => Ok(Self::InverseTupleGf2n),
            "SQUARE_TUPLE_GFP" => Ok(Self::SquareTupleGfp),
            "SQUARE_TUPLE_GF2N" => Ok(Self::SquareTupleGf2n),
            "MULTIPLICATION_TRIPLE_GFP" => Ok(Self::MultiplicationTripleGfp),
            "MULTIPLICATION_TRIPLE_GF2N" => Ok(Self::MultiplicationTripleGf2n),
            other => Err(format!("unknown tuple type: {}", other)),
        }
    }
}

/// Activation state shared by fragments and reservations.
///
/// Material starts `Locked` (ingested or reserved, but not yet agreed across
/// all parties) and becomes `Unlocked` once every party has acknowledged it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivationStatus {
    Locked,
    Unlocked,
}

/// A batch of offline-produced tuples uploaded as one unit.
///
/// The payload lives in an external object store; the core only tracks the
/// chunk's identity, type, and size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleChunk {
    /// Unique chunk identifier.
    pub chunk_id: Uuid,
    /// Type of every tuple in the chunk.
    pub tuple_type: TupleType,
    /// Number of tuples in the chunk, at least 1.
    pub number_of_tuples: u64,
}

impl TupleChunk {
    pub fn new(chunk_id: Uuid, tuple_type: TupleType, number_of_tuples: u64) -> Self {
        Self {
            chunk_id,
            tuple_type,
            number_of_tuples,
        }
    }
}

/// A half-open tuple range `[start_index, end_index)` within one chunk.
///
/// Fragments are the unit of availability tracking: the store splits them as
/// reservations carve out sub-ranges and deletes them when a reservation is
/// released. `id` is assigned by the repository (0 until stored) and only
/// used for stable FIFO ordering across chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Repository-assigned monotonic identifier; 0 until stored.
    pub id: u64,
    /// Chunk this fragment belongs to.
    pub chunk_id: Uuid,
    /// Tuple type, always equal to the chunk's.
    pub tuple_type: TupleType,
    /// First tuple index covered, inclusive.
    pub start_index: u64,
    /// First tuple index past the range, exclusive.
    pub end_index: u64,
    /// Whether the range may be handed out yet.
    pub activation_status: ActivationStatus,
    /// Reservation this range is exclusively promised to, if any.
    pub reservation_id: Option<String>,
}

impl Fragment {
    /// Create an unstored fragment with the given status and no reservation.
    pub fn new(
        chunk_id: Uuid,
        tuple_type: TupleType,
        start_index: u64,
        end_index: u64,
        activation_status: ActivationStatus,
    ) -> Self {
        Self {
            id: 0,
            chunk_id,
            tuple_type,
            start_index,
            end_index,
            activation_status,
            reservation_id: None,
        }
    }

    /// Number of tuples covered by this fragment.
    pub fn len(&self) -> u64 {
        self.end_index.saturating_sub(self.start_index)
    }

    pub fn is_empty(&self) -> bool {
        self.start_index >= self.end_index
    }

    /// Whether this fragment may back a new reservation.
    pub fn is_available(&self) -> bool {
        self.activation_status == ActivationStatus::Unlocked && self.reservation_id.is_none()
    }

    /// Whether `[start_index, end_index)` intersects the given range.
    pub fn overlaps(&self, start_index: u64, end_index: u64) -> bool {
        self.start_index < end_index && self.end_index > start_index
    }

    /// Whether the fragment covers the given tuple index.
    pub fn contains(&self, index: u64) -> bool {
        self.start_index <= index && index < self.end_index
    }
}

/// One contiguous range within one chunk inside a reservation.
///
/// Element order inside a reservation defines the consumption order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationElement {
    /// Chunk the range lives in.
    pub chunk_id: Uuid,
    /// First reserved tuple index.
    pub start_index: u64,
    /// Number of consecutive tuples reserved.
    pub reserved_tuples: u64,
}

impl ReservationElement {
    pub fn new(chunk_id: Uuid, start_index: u64, reserved_tuples: u64) -> Self {
        Self {
            chunk_id,
            start_index,
            reserved_tuples,
        }
    }

    /// First index past the reserved range.
    ///
    /// `None` if `start_index + reserved_tuples` overflows.
    pub fn end_index(&self) -> Option<u64> {
        self.start_index.checked_add(self.reserved_tuples)
    }
}

/// A named, ordered list of tuple ranges withheld for one request.
///
/// Created `Locked` on the master, replicated verbatim to every slave, and
/// activated once all parties have applied it. Only `status` ever mutates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// Identifier, by convention `"<requestUuid>_<TUPLE_TYPE>"`.
    pub reservation_id: String,
    /// Type of every tuple covered by the reservation.
    pub tuple_type: TupleType,
    /// Lifecycle state; `Unlocked` once all parties acknowledged.
    pub status: ActivationStatus,
    /// Reserved ranges in consumption order.
    pub elements: Vec<ReservationElement>,
}

impl Reservation {
    /// Create a new reservation in the `Locked` state.
    pub fn new(
        reservation_id: impl Into<String>,
        tuple_type: TupleType,
        elements: Vec<ReservationElement>,
    ) -> Self {
        Self {
            reservation_id: reservation_id.into(),
            tuple_type,
            status: ActivationStatus::Locked,
            elements,
        }
    }

    /// Canonical reservation id for a request and tuple type.
    pub fn id_for(request_id: Uuid, tuple_type: TupleType) -> String {
        format!("{}_{}", request_id, tuple_type)
    }

    /// Total number of tuples named by the reservation's elements.
    pub fn total_tuples(&self) -> u64 {
        self.elements.iter().map(|e| e.reserved_tuples).sum()
    }
}

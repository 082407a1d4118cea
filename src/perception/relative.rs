use std::cmp::Ordering;
use std::fmt;

/// A lateral direction relative to a vehicle's heading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LateralDirection {
    Left,
    None,
    Right,
}

impl LateralDirection {
    /// The opposite direction.
    pub fn flip(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::None => Self::None,
            Self::Right => Self::Left,
        }
    }

    pub fn is_left(self) -> bool {
        self == Self::Left
    }

    pub fn is_right(self) -> bool {
        self == Self::Right
    }

    pub fn is_none(self) -> bool {
        self == Self::None
    }
}

/// A lane relative to the lane a vehicle is on, e.g. "the second lane to the left".
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelativeLane {
    lat: LateralDirection,
    num_lanes: u8,
}

impl RelativeLane {
    pub const CURRENT: Self = Self {
        lat: LateralDirection::None,
        num_lanes: 0,
    };
    pub const LEFT: Self = Self {
        lat: LateralDirection::Left,
        num_lanes: 1,
    };
    pub const RIGHT: Self = Self {
        lat: LateralDirection::Right,
        num_lanes: 1,
    };
    pub const SECOND_LEFT: Self = Self {
        lat: LateralDirection::Left,
        num_lanes: 2,
    };
    pub const SECOND_RIGHT: Self = Self {
        lat: LateralDirection::Right,
        num_lanes: 2,
    };

    /// Creates a relative lane.
    ///
    /// # Panics
    /// If `lat` is `None` and `num_lanes` is not zero, or vice versa.
    pub fn new(lat: LateralDirection, num_lanes: u8) -> Self {
        if lat.is_none() != (num_lanes == 0) {
            panic!("Relative lane {:?} cannot be {} lanes away", lat, num_lanes);
        }
        Self { lat, num_lanes }
    }

    pub fn lateral_direction(&self) -> LateralDirection {
        self.lat
    }

    pub fn num_lanes(&self) -> u8 {
        self.num_lanes
    }

    pub fn is_current(&self) -> bool {
        self.num_lanes == 0
    }

    /// The signed lane offset; negative to the left.
    pub fn offset(&self) -> i16 {
        match self.lat {
            LateralDirection::Left => -(self.num_lanes as i16),
            LateralDirection::None => 0,
            LateralDirection::Right => self.num_lanes as i16,
        }
    }

    /// The lane one step to the left of this one.
    pub fn left(&self) -> Self {
        Self::from_offset(self.offset() - 1)
    }

    /// The lane one step to the right of this one.
    pub fn right(&self) -> Self {
        Self::from_offset(self.offset() + 1)
    }

    /// The lane one step in the given direction.
    pub fn shifted(&self, lat: LateralDirection) -> Self {
        match lat {
            LateralDirection::Left => self.left(),
            LateralDirection::None => *self,
            LateralDirection::Right => self.right(),
        }
    }

    fn from_offset(offset: i16) -> Self {
        match offset.cmp(&0) {
            Ordering::Less => Self::new(LateralDirection::Left, (-offset) as u8),
            Ordering::Equal => Self::CURRENT,
            Ordering::Greater => Self::new(LateralDirection::Right, offset as u8),
        }
    }
}

impl PartialOrd for RelativeLane {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Lanes are ordered left to right.
impl Ord for RelativeLane {
    fn cmp(&self, other: &Self) -> Ordering {
        self.offset().cmp(&other.offset())
    }
}

impl fmt::Debug for RelativeLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lat {
            LateralDirection::None => write!(f, "RelativeLane(CURRENT)"),
            lat => write!(f, "RelativeLane({:?}, {})", lat, self.num_lanes),
        }
    }
}

//! Checkpoint topology for the five walking routes.
//!
//! Every route is a fixed, ordered list of named waypoints: index 0 is the
//! start line and the last index is the finish. A team that has registered
//! but not yet left the start sits at [`NOT_DEPARTED`].
//!
//! All lookups here are total: an index outside a route's list resolves to
//! [`UNKNOWN_POINT`] rather than failing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Checkpoint index of a team that has not left the start line yet.
pub const NOT_DEPARTED: i8 = -1;

/// Display name for an index that is not on the route.
pub const UNKNOWN_POINT: &str = "未知点位";

/// Label of the synthetic group of submitted teams that never showed up.
pub const NOT_ARRIVED: &str = "未到";

const ZHAOHUI: &[&str] = &[
    "起点",
    "上塘映翠",
    "京杭大运河",
    "西湖文化广场",
    "中国海事",
    "忠亭",
    "德胜运河驿站",
    "终点",
];

const PINGFENG_HALF: &[&str] = &["起点", "金莲寺", "老焦山", "屏峰山", "屏峰善院", "终点"];

const PINGFENG_FULL: &[&str] = &[
    "起点",
    "金莲寺",
    "白龙潭",
    "慈母桥",
    "古樟树公园",
    "屏峰山",
    "屏峰善院",
    "终点",
];

const MOGANSHAN_HALF: &[&str] = &["起点", "终点"];

const MOGANSHAN_FULL: &[&str] = &["起点", "兆丰公园", "滑板公园", "天安云谷", "东苕溪", "终点"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Zhaohui,
    PingfengHalf,
    PingfengFull,
    MoganshanHalf,
    MoganshanFull,
}

impl Route {
    pub const ALL: [Route; 5] = [
        Route::Zhaohui,
        Route::PingfengHalf,
        Route::PingfengFull,
        Route::MoganshanHalf,
        Route::MoganshanFull,
    ];

    /// Numeric route code used by checkpoint devices and admin tooling.
    pub fn code(&self) -> u8 {
        match self {
            Route::Zhaohui => 1,
            Route::PingfengHalf => 2,
            Route::PingfengFull => 3,
            Route::MoganshanHalf => 4,
            Route::MoganshanFull => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Route::Zhaohui),
            2 => Some(Route::PingfengHalf),
            3 => Some(Route::PingfengFull),
            4 => Some(Route::MoganshanHalf),
            5 => Some(Route::MoganshanFull),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Route::Zhaohui => "朝晖",
            Route::PingfengHalf => "屏峰半程",
            Route::PingfengFull => "屏峰全程",
            Route::MoganshanHalf => "莫干山半程",
            Route::MoganshanFull => "莫干山全程",
        }
    }

    /// Ordered waypoint names, start first and finish last.
    pub fn checkpoints(&self) -> &'static [&'static str] {
        match self {
            Route::Zhaohui => ZHAOHUI,
            Route::PingfengHalf => PINGFENG_HALF,
            Route::PingfengFull => PINGFENG_FULL,
            Route::MoganshanHalf => MOGANSHAN_HALF,
            Route::MoganshanFull => MOGANSHAN_FULL,
        }
    }

    /// Index of the finish line.
    pub fn terminal_index(&self) -> i8 {
        // Longest list has 8 entries, so the cast cannot truncate.
        (self.checkpoints().len() - 1) as i8
    }

    /// Whether `point` is a legal checkpoint index for a team on this route,
    /// including the not-departed sentinel.
    pub fn is_valid_point(&self, point: i8) -> bool {
        (NOT_DEPARTED..=self.terminal_index()).contains(&point)
    }

    pub fn point_name(&self, point: i8) -> &'static str {
        usize::try_from(point)
            .ok()
            .and_then(|idx| self.checkpoints().get(idx))
            .copied()
            .unwrap_or(UNKNOWN_POINT)
    }

    /// Half and full routes on the same campus share checkpoint staff.
    pub fn is_sibling_of(&self, other: Route) -> bool {
        matches!(
            (self, other),
            (Route::PingfengHalf, Route::PingfengFull)
                | (Route::PingfengFull, Route::PingfengHalf)
                | (Route::MoganshanHalf, Route::MoganshanFull)
                | (Route::MoganshanFull, Route::MoganshanHalf)
        )
    }

    /// Whether an operator stationed on `self` may record check-ins for a
    /// team walking `team_route`.
    pub fn covers(&self, team_route: Route) -> bool {
        *self == team_route || self.is_sibling_of(team_route)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Waypoint name by raw route code, for callers holding an unvalidated code.
pub fn point_name(route_code: u8, point: i8) -> &'static str {
    Route::from_code(route_code)
        .map(|route| route.point_name(point))
        .unwrap_or(UNKNOWN_POINT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_codes_round_trip() {
        for route in Route::ALL {
            assert_eq!(Route::from_code(route.code()), Some(route));
        }
        assert_eq!(Route::from_code(0), None);
        assert_eq!(Route::from_code(6), None);
    }

    #[test]
    fn test_terminal_indices() {
        assert_eq!(Route::Zhaohui.terminal_index(), 7);
        assert_eq!(Route::PingfengHalf.terminal_index(), 5);
        assert_eq!(Route::PingfengFull.terminal_index(), 7);
        assert_eq!(Route::MoganshanHalf.terminal_index(), 1);
        assert_eq!(Route::MoganshanFull.terminal_index(), 5);
    }

    #[test]
    fn test_point_name_in_range() {
        assert_eq!(Route::PingfengFull.point_name(0), "起点");
        assert_eq!(Route::PingfengFull.point_name(2), "白龙潭");
        assert_eq!(Route::PingfengFull.point_name(7), "终点");
        assert_eq!(point_name(1, 3), "西湖文化广场");
    }

    #[test]
    fn test_point_name_out_of_range_is_unknown() {
        assert_eq!(Route::MoganshanHalf.point_name(2), UNKNOWN_POINT);
        assert_eq!(Route::Zhaohui.point_name(NOT_DEPARTED), UNKNOWN_POINT);
        assert_eq!(Route::Zhaohui.point_name(i8::MIN), UNKNOWN_POINT);
        assert_eq!(Route::Zhaohui.point_name(i8::MAX), UNKNOWN_POINT);
        assert_eq!(point_name(9, 0), UNKNOWN_POINT);
    }

    #[test]
    fn test_valid_points_include_sentinel() {
        assert!(Route::PingfengHalf.is_valid_point(NOT_DEPARTED));
        assert!(Route::PingfengHalf.is_valid_point(5));
        assert!(!Route::PingfengHalf.is_valid_point(6));
        assert!(!Route::PingfengHalf.is_valid_point(-2));
    }

    #[test]
    fn test_sibling_routes_share_operators() {
        assert!(Route::PingfengHalf.covers(Route::PingfengFull));
        assert!(Route::MoganshanFull.covers(Route::MoganshanHalf));
        assert!(Route::Zhaohui.covers(Route::Zhaohui));
        assert!(!Route::Zhaohui.covers(Route::PingfengHalf));
        assert!(!Route::PingfengFull.covers(Route::MoganshanFull));
    }
}

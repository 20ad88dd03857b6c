//! The persisted keyspace.
//!
//! External inspectors read these keys directly, so names and templates must not change.

use std::fmt::Display;

/// Sorted set of player scores.
pub const LEADERBOARD: &str = "leaderboard:global";
/// Set of players currently online.
pub const ONLINE_PLAYERS: &str = "online:players";
/// Capped list of JSON chat and achievement messages, newest first.
pub const MESSAGES: &str = "messages:global";
/// Counter advanced once per interval while the simulation runs.
pub const COUNTER: &str = "migration:demo:counter";

/// Endpoints that get a rate-limit counter per player in the dataset.
pub const RATE_LIMIT_ENDPOINTS: [&str; 4] = ["login", "game_action", "chat", "leaderboard"];

pub fn session(player: &str) -> String {
    format!("user:session:{player}")
}

pub fn cache_item(item: &str, index: usize) -> String {
    format!("cache:item:{item}:{index}")
}

pub fn lobby(id: impl Display) -> String {
    format!("game:lobby:{id}")
}

pub fn rate_limit(endpoint: &str, player: &str) -> String {
    format!("ratelimit:{endpoint}:{player}")
}

pub fn achievement(player: &str, achievement: &str) -> String {
    format!("achievement:{player}:{achievement}")
}

pub fn analytics_event(timestamp: u64, index: usize) -> String {
    format!("analytics:event:{timestamp}:{index}")
}

pub fn notification(player: &str, id: impl Display) -> String {
    format!("notification:{player}:{id}")
}

pub fn temp_lobby(id: impl Display) -> String {
    format!("temp:lobby:{id}")
}

pub fn temp_match(id: impl Display) -> String {
    format!("temp:match:{id}")
}

pub fn rapid_cache(id: impl Display) -> String {
    format!("cache:rapid:{id}")
}

pub fn cache_update(slot: u32) -> String {
    format!("cache:update:{slot}")
}

pub fn temp_session(id: impl Display) -> String {
    format!("temp:session:{id}")
}

pub fn temp_data(id: impl Display) -> String {
    format!("temp:data:{id}")
}

pub fn rate(player: &str, slot: u32) -> String {
    format!("rate:{player}:{slot}")
}

pub fn temp_event(timestamp: u64, slot: u32) -> String {
    format!("event:temp:{timestamp}:{slot}")
}

pub fn realtime_analytics(timestamp: u64, slot: u32) -> String {
    format!("analytics:realtime:{timestamp}:{slot}")
}

pub fn purchase(player: &str, id: impl Display) -> String {
    format!("purchase:{player}:{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_are_stable() {
        assert_eq!(session("Ice_Queen"), "user:session:Ice_Queen");
        assert_eq!(cache_item("Fire_Ring", 7), "cache:item:Fire_Ring:7");
        assert_eq!(rate_limit("chat", "Ice_Queen"), "ratelimit:chat:Ice_Queen");
        assert_eq!(achievement("Ice_Queen", "Godlike"), "achievement:Ice_Queen:Godlike");
        assert_eq!(analytics_event(1700000000, 3), "analytics:event:1700000000:3");
        assert_eq!(cache_update(12), "cache:update:12");
        assert_eq!(rate("Ice_Queen", 99), "rate:Ice_Queen:99");
        assert_eq!(temp_event(1700000000, 5), "event:temp:1700000000:5");
        assert_eq!(
            realtime_analytics(1700000000, 5),
            "analytics:realtime:1700000000:5"
        );
        assert_eq!(lobby("abc"), "game:lobby:abc");
        assert_eq!(purchase("Ice_Queen", "abc"), "purchase:Ice_Queen:abc");
    }
}

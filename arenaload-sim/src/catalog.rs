//! Static vocabulary the generated data draws from.

use rand::Rng;

/// Player names used for the leaderboard, sessions and messages.
///
/// Rosters larger than this list are padded with synthetic names, see [`roster`].
pub const PLAYER_NAMES: &[&str] = &[
    "Shadow_Warrior", "Lightning_Strike", "Phoenix_Fire", "Ice_Queen", "Storm_Rider",
    "Blade_Master", "Night_Hunter", "Fire_Dragon", "Steel_Wolf", "Thunder_God",
    "Dark_Knight", "Frost_Mage", "Blood_Reaper", "Wind_Walker", "Stone_Crusher",
    "Flash_Bang", "Venom_Strike", "Cyber_Ninja", "Plasma_Gun", "Quantum_Leap",
    "Neon_Ghost", "Turbo_Boost", "Laser_Beam", "Rocket_Jump", "Power_Surge",
    "Alpha_Wolf", "Beta_Test", "Gamma_Ray", "Delta_Force", "Omega_Strike",
    "Nova_Blast", "Comet_Tail", "Asteroid_Belt", "Galaxy_Guard", "Cosmic_Dust",
    "Pixel_Perfect", "Code_Breaker", "Data_Stream", "Circuit_Board", "Binary_Beast",
    "Mystic_Sword", "Legendary_Bow", "Epic_Shield", "Magic_Wand", "Sacred_Rune",
    "Battle_Axe", "War_Hammer", "Steel_Blade", "Silver_Arrow", "Golden_Crown",
    "Dragon_Slayer", "Phoenix_Rising", "Shadow_Clone", "Lightning_Bolt", "Ice_Shard",
    "Fire_Storm", "Wind_Blade", "Earth_Shaker", "Water_Spirit", "Metal_Gear",
    "Neon_Racer", "Cyber_Punk", "Space_Marine", "Time_Traveler", "Dimension_Walker",
    "Quantum_Fighter", "Plasma_Warrior", "Laser_Knight", "Rocket_Ranger", "Turbo_Driver",
    "Speed_Demon", "Power_House", "Energy_Blast", "Force_Field", "Shield_Bearer",
    "Sword_Saint", "Bow_Master", "Staff_Wielder", "Hammer_Time", "Axe_Grinder",
    "Spell_Caster", "Rune_Keeper", "Crystal_Mage", "Elemental_Lord", "Arcane_Scholar",
    "Battle_Mage", "War_Chief", "Guild_Master", "Arena_Champion", "Tournament_King",
    "Legend_Hunter", "Myth_Buster", "Epic_Gamer", "Pro_Player", "Elite_Warrior",
    "Master_Chief", "Commander_X", "Captain_Strike", "General_Storm", "Admiral_Frost",
    "Knight_Rider", "Paladin_Light", "Guardian_Angel", "Defender_Prime", "Protector_Max",
    "Assassin_Swift", "Rogue_Shadow", "Thief_Quick", "Ninja_Fast", "Spy_Silent",
    "Ranger_Wild", "Hunter_Sharp", "Tracker_Keen", "Scout_Alert", "Explorer_Bold",
];

pub const GAME_ITEMS: &[&str] = &[
    "Legendary_Sword", "Epic_Shield", "Rare_Bow", "Magic_Staff", "Dragon_Armor",
    "Phoenix_Wings", "Lightning_Boots", "Frost_Gloves", "Fire_Ring", "Shadow_Cape",
    "Crystal_Helm", "Mithril_Chain", "Adamant_Plate", "Elven_Cloak", "Dwarven_Axe",
    "Orc_Hammer", "Troll_Club", "Giant_Mace", "Demon_Blade", "Angel_Harp",
    "Healing_Potion", "Mana_Elixir", "Speed_Boost", "Strength_Brew", "Wisdom_Tea",
    "Lucky_Charm", "Exp_Gem", "Gold_Coin", "Silver_Token", "Bronze_Medal",
];

pub const ACHIEVEMENTS: &[&str] = &[
    "First_Blood", "Double_Kill", "Triple_Kill", "Monster_Kill", "Unstoppable",
    "Dominating", "Godlike", "Legendary", "Beyond_Godlike", "Rampage",
    "Killing_Spree", "Ultra_Kill", "Perfect_Game", "Flawless_Victory", "Master_Class",
    "Speed_Runner", "Collector", "Explorer", "Guardian", "Destroyer",
];

/// Placeholder in [`CHAT_TEMPLATES`] replaced by a second player's name.
pub const PLAYER_PLACEHOLDER: &str = "{player}";

pub const CHAT_TEMPLATES: &[&str] = &[
    "GG everyone! 🎮", "Who wants to team up?", "Epic match! 🔥", "Anyone up for a challenge?",
    "New high score! 💪", "This game is intense!", "Great teamwork guys", "Ready for round 2?",
    "Nice moves @{player}!", "That was close! 😅", "Level up! 🎊", "Achievement unlocked!",
    "Lag is killing me 😤", "Best game ever!", "Who's leading now?", "Time for revenge 😈",
    "Clutch play right there", "Can't stop playing!", "One more game?", "Victory! 🏆",
    "Insane combo!", "Perfect timing!", "What a save!", "Incredible shot!", "Unbelievable!",
    "That's how it's done!", "Show me your skills!", "Bring it on!", "Let's do this!",
    "Amazing play!", "GG @{player}, rematch?", "Spectacular!", "Outstanding!", "Phenomenal!",
];

pub const SESSION_STATUSES: &[&str] = &["online", "playing", "idle"];
pub const ACTIVITY_STATUSES: &[&str] = &["playing", "idle", "in-menu", "in-game"];
pub const RARITIES: &[&str] = &["common", "rare", "epic", "legendary"];
pub const GAME_MODES: &[&str] = &["deathmatch", "team_battle", "survival", "tournament"];
pub const MAPS: &[&str] = &["arena1", "castle", "desert", "forest", "city"];
pub const LOBBY_STATUSES: &[&str] = &["waiting", "starting", "active"];
pub const EVENT_TYPES: &[&str] = &[
    "login", "logout", "game_start", "game_end", "purchase", "achievement",
];
pub const EVENT_MODES: &[&str] = &["solo", "team", "tournament"];
pub const NOTIFICATION_TYPES: &[&str] = &["friend_request", "game_invite", "achievement", "system"];
pub const ANALYTICS_ACTIONS: &[&str] = &["click", "view", "purchase", "achievement", "level_up"];

/// Returns `count` distinct player names.
///
/// Catalog names come first, followed by `Player_{n}` for every slot beyond the catalog.
pub fn roster(count: usize) -> Vec<String> {
    PLAYER_NAMES
        .iter()
        .map(|name| (*name).to_owned())
        .chain((PLAYER_NAMES.len() + 1..).map(|n| format!("Player_{n}")))
        .take(count)
        .collect()
}

/// Picks one entry uniformly. `items` must not be empty.
pub(crate) fn pick<'a, T, R: Rng + ?Sized>(rng: &mut R, items: &'a [T]) -> &'a T {
    &items[rng.random_range(0..items.len())]
}

pub mod game_bridge;
pub mod knowledge;
pub mod storage;
pub mod templates;

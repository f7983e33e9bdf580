//! Game-relative positions of everything the automation clicks or reads.
//!
//! All values are offsets from the calibrated [`Origin`](super::Origin) for the
//! default 960x600 game layout. A layout change in the game means editing this
//! file and re-calibrating; nothing here is discovered at runtime.

use crate::automation::options::{Augment, Loadout, MenuItem};
use crate::capture::{Color, Point, Rect};

/// Landmark colour of the game's top-left border pixel.
pub const TOP_LEFT_COLOR: &str = "212429";

// Sidebar
const MENU_X: i32 = 233;
const MENU_Y0: i32 = 43;
const MENU_STEP: i32 = 29;

pub const REBIRTH_MENU: Point = Point::new(91, 406);
pub const REBIRTH_BUTTON: Point = Point::new(536, 442);
pub const REBIRTH_CONFIRM: Point = Point::new(425, 318);
/// Rebirth page heading; shows the challenge name while one runs
pub const CHALLENGE_TEXT: Rect = Rect::new(310, 100, 420, 30);

pub const EXP_MENU: Point = Point::new(91, 520);
pub const EXP_TEXT: Rect = Rect::new(390, 110, 260, 22);

// Fight boss page
pub const NUKE: Point = Point::new(625, 110);
pub const FIGHT: Point = Point::new(625, 210);
pub const BOSS_NUMBER: Rect = Rect::new(765, 125, 60, 22);

// Inventory
const LOADOUT_X0: i32 = 301;
const LOADOUT_STEP: i32 = 29;
const LOADOUT_Y: i32 = 525;
pub const EQUIPMENT_SLOTS: [Point; 8] = [
    Point::new(480, 250), // head
    Point::new(480, 300), // chest
    Point::new(480, 350), // legs
    Point::new(480, 400), // boots
    Point::new(430, 300), // weapon
    Point::new(530, 250), // accessory 1
    Point::new(530, 300), // accessory 2
    Point::new(530, 350), // accessory 3
];

// Adventure
pub const ADV_LEFT_ARROW: Point = Point::new(315, 212);
pub const ADV_RIGHT_ARROW: Point = Point::new(917, 212);
pub const ITOPOD_BUTTON: Point = Point::new(373, 212);
pub const ITOPOD_OPTIMAL: Point = Point::new(630, 240);
pub const ITOPOD_ENTER: Point = Point::new(635, 285);
pub const IDLE_INDICATOR: Point = Point::new(316, 84);
pub const IDLE_ON_COLOR: Color = Color::rgb(0xFF, 0xEB, 0x04);
/// A pixel on the enemy's health bar; the bar is drawn only while an enemy is alive
pub const ENEMY_HEALTH: Point = Point::new(731, 413);
pub const ENEMY_HEALTH_COLOR: Color = Color::rgb(0xD9, 0x3A, 0x3A);

// Custom energy input box shared by the augment and time machine pages
pub const ENERGY_INPUT: Point = Point::new(440, 70);

// Time machine
pub const TM_SPEED: Point = Point::new(532, 233);
pub const TM_MULT: Point = Point::new(532, 333);

// Augmentation
const AUG_ADD_X: i32 = 532;
const AUG_Y0: i32 = 235;
const AUG_PAIR_STEP: i32 = 58;
const AUG_UPGRADE_STEP: i32 = 26;

// Blood magic
const BM_CAP_X: i32 = 570;
const BM_Y0: i32 = 228;
const BM_STEP: i32 = 35;
pub const BLOOD_SPELLS_TAB: Point = Point::new(380, 105);
pub const BLOOD_PILL: Point = Point::new(735, 300);

// Wandoos
pub const WANDOOS_ENERGY_CAP: Point = Point::new(942, 254);
pub const WANDOOS_MAGIC_CAP: Point = Point::new(942, 347);

// Gold diggers
const DIG_PAGE_X0: i32 = 318;
const DIG_PAGE_STEP: i32 = 58;
const DIG_PAGE_Y: i32 = 110;
const DIG_CAP_X: i32 = 833;
const DIG_ACTIVE_X: i32 = 286;
const DIG_Y0: i32 = 210;
const DIG_STEP: i32 = 104;
pub const DIG_ACTIVE_COLOR: Color = Color::rgb(0x3C, 0xB3, 0x4B);

// Money pit
pub const PIT_FEED: Point = Point::new(631, 363);
pub const PIT_CONFIRM: Point = Point::new(436, 315);
pub const SPIN_TAB: Point = Point::new(822, 235);
pub const SPIN_BUTTON: Point = Point::new(713, 562);

// Questing
pub const QUEST_TEXT: Rect = Rect::new(310, 230, 630, 120);
pub const QUEST_START: Point = Point::new(626, 180);
pub const QUEST_COMPLETE: Point = Point::new(626, 180);
pub const QUEST_POINTS: Rect = Rect::new(310, 400, 300, 22);

pub fn menu_item(item: MenuItem) -> Point {
    Point::new(MENU_X, MENU_Y0 + item.row() as i32 * MENU_STEP)
}

pub fn loadout_button(loadout: Loadout) -> Point {
    Point::new(LOADOUT_X0 + loadout.index() as i32 * LOADOUT_STEP, LOADOUT_Y)
}

/// "+" button of an augment row.
pub fn augment_add(augment: Augment) -> Point {
    let pair = (augment.row() / 2) as i32;
    let mut y = AUG_Y0 + pair * AUG_PAIR_STEP;
    if augment.is_upgrade() {
        y += AUG_UPGRADE_STEP;
    }
    Point::new(AUG_ADD_X, y)
}

/// Cap button of a blood magic ritual (0-based).
pub fn blood_magic_cap(ritual: usize) -> Point {
    Point::new(BM_CAP_X, BM_Y0 + ritual as i32 * BM_STEP)
}

pub fn digger_page(page: usize) -> Point {
    Point::new(DIG_PAGE_X0 + page as i32 * DIG_PAGE_STEP, DIG_PAGE_Y)
}

pub fn digger_cap(slot: usize) -> Point {
    Point::new(DIG_CAP_X, DIG_Y0 + slot as i32 * DIG_STEP)
}

pub fn digger_active(slot: usize) -> Point {
    Point::new(DIG_ACTIVE_X, DIG_Y0 + slot as i32 * DIG_STEP)
}

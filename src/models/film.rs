use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::EntityId;

/// Motion-picture content rating
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Mpa {
    #[serde(rename = "G")]
    G,
    #[serde(rename = "PG")]
    Pg,
    #[serde(rename = "PG-13")]
    Pg13,
    #[serde(rename = "R")]
    R,
    #[serde(rename = "NC-17")]
    Nc17,
}

impl Mpa {
    pub const ALL: [Mpa; 5] = [Mpa::G, Mpa::Pg, Mpa::Pg13, Mpa::R, Mpa::Nc17];

    pub fn id(self) -> i32 {
        match self {
            Mpa::G => 1,
            Mpa::Pg => 2,
            Mpa::Pg13 => 3,
            Mpa::R => 4,
            Mpa::Nc17 => 5,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|mpa| mpa.id() == id)
    }
}

/// Film genre from the fixed catalog
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Genre {
    Comedy,
    Drama,
    Animation,
    Thriller,
    Documentary,
    Action,
}

impl Genre {
    pub const ALL: [Genre; 6] = [
        Genre::Comedy,
        Genre::Drama,
        Genre::Animation,
        Genre::Thriller,
        Genre::Documentary,
        Genre::Action,
    ];

    pub fn id(self) -> i32 {
        match self {
            Genre::Comedy => 1,
            Genre::Drama => 2,
            Genre::Animation => 3,
            Genre::Thriller => 4,
            Genre::Documentary => 5,
            Genre::Action => 6,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|genre| genre.id() == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Director {
    pub id: EntityId,
    pub name: String,
}

/// A film in the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Film {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub release_date: NaiveDate,
    /// Duration in minutes
    pub duration: u32,
    pub mpa: Mpa,
    pub genres: BTreeSet<Genre>,
    /// Directors ordered by id
    pub directors: Vec<Director>,
}

impl Film {
    pub fn release_year(&self) -> i32 {
        self.release_date.year()
    }

    pub fn has_director(&self, director_id: EntityId) -> bool {
        self.directors.iter().any(|d| d.id == director_id)
    }
}

/// Film fields supplied on creation; the store assigns the id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewFilm {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub release_date: NaiveDate,
    pub duration: u32,
    pub mpa: Mpa,
    #[serde(default)]
    pub genres: BTreeSet<Genre>,
    #[serde(default)]
    pub director_ids: BTreeSet<EntityId>,
}

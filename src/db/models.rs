use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares a closed set of lowercase string values stored as TEXT.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "unknown {} '{}'",
                        stringify!($name).to_lowercase(),
                        other
                    )),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum!(
    AuthType {
        Native => "native",
        Oauth => "oauth",
    }
);

text_enum!(
    /// Garment category.
    PieceKind {
        Top => "top",
        Bottom => "bottom",
        Outerwear => "outerwear",
        Dress => "dress",
        Shoes => "shoes",
        Accessory => "accessory",
        Bag => "bag",
        Other => "other",
    }
);

text_enum!(
    Color {
        Black => "black",
        White => "white",
        Gray => "gray",
        Red => "red",
        Orange => "orange",
        Yellow => "yellow",
        Green => "green",
        Blue => "blue",
        Purple => "purple",
        Pink => "pink",
        Brown => "brown",
        Beige => "beige",
        Multi => "multi",
    }
);

text_enum!(
    OutfitTag {
        Casual => "casual",
        Formal => "formal",
        Work => "work",
        Athletic => "athletic",
        Evening => "evening",
        Favorite => "favorite",
    }
);

text_enum!(
    /// What a shelf item points at.
    ShelfItemKind {
        Piece => "piece",
        Outfit => "outfit",
    }
);

// --- Wardrobe ---

/// Public view of a user. The password hash never leaves the database layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub auth_type: AuthType,
    pub created_at: String,
    pub piece_ids: Vec<String>,
    pub outfit_ids: Vec<String>,
    pub shelf_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Piece {
    pub id: String,
    pub name: String,
    pub kind: PieceKind,
    pub color: Color,
    pub brand: Option<String>,
    pub size: Option<String>,
    pub notes: Option<String>,
    pub purchase_url: Option<String>,
    pub images: Vec<String>,
    pub creator_id: String,
    pub creator_username: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outfit {
    pub id: String,
    pub name: String,
    pub creator_id: String,
    pub creator_username: String,
    pub tags: Vec<OutfitTag>,
    pub pieces: Vec<Piece>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShelfItem {
    pub kind: ShelfItemKind,
    pub item_id: String,
    pub added_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shelf {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub creator_id: String,
    pub creator_username: String,
    pub items: Vec<ShelfItem>,
    pub created_at: String,
    pub updated_at: String,
}

// --- Tickets ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub venue: String,
    pub description: Option<String>,
    pub starts_at: String,
    pub price_cents: i64,
    pub tickets_available: i64,
    pub image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub event_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchasedItem {
    pub id: String,
    pub event_id: String,
    pub quantity: i64,
    pub purchased_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub cart: Vec<CartItem>,
    pub purchased: Vec<PurchasedItem>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub event_id: String,
    pub quantity: i64,
    pub total_cents: i64,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_text() {
        for kind in PieceKind::ALL {
            assert_eq!(kind.as_str().parse::<PieceKind>().unwrap(), *kind);
        }
        for color in Color::ALL {
            assert_eq!(color.as_str().parse::<Color>().unwrap(), *color);
        }
    }

    #[test]
    fn unknown_value_names_the_enum() {
        let err = "neon".parse::<Color>().unwrap_err();
        assert_eq!(err, "unknown color 'neon'");
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&ShelfItemKind::Outfit).unwrap();
        assert_eq!(json, "\"outfit\"");
        let tag: OutfitTag = serde_json::from_str("\"favorite\"").unwrap();
        assert_eq!(tag, OutfitTag::Favorite);
    }

    #[test]
    fn sqlite_round_trip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT)").unwrap();
        conn.execute("INSERT INTO t (v) VALUES (?1)", [PieceKind::Outerwear])
            .unwrap();
        let back: PieceKind = conn.query_row("SELECT v FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(back, PieceKind::Outerwear);

        conn.execute("UPDATE t SET v = 'cape'", []).unwrap();
        let bad: rusqlite::Result<PieceKind> = conn.query_row("SELECT v FROM t", [], |r| r.get(0));
        assert!(bad.is_err());
    }
}

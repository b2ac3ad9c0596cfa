use serde::{Deserialize, Serialize};

use crate::Reservation;

pub trait Id {
    fn id(&self) -> i64;
}

/// Keyset pagination state handed back to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pager {
    /// cursor to pass to fetch the following page, if there is one
    pub next: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub cursor: Option<i64>,
    pub page_size: i64,
    pub desc: bool,
}

impl PageInfo {
    /// `data` holds up to `page_size + 1` rows read past the cursor. The extra
    /// row is dropped, it only tells whether another page exists.
    pub fn get_pager<T: Id>(&self, data: &mut Vec<T>) -> Pager {
        let page_size = self.page_size.max(0) as usize;
        let has_next = data.len() > page_size;
        data.truncate(page_size);
        Pager {
            next: if has_next {
                data.last().map(Id::id)
            } else {
                None
            },
        }
    }
}

impl Id for Reservation {
    fn id(&self) -> i64 {
        self.id
    }
}

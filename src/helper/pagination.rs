use serde::Serialize;

/// Where a listing page sits within its result set.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PageInfo {
    pub number: u32,
    pub num_pages: u32,
    pub per_page: u32,
    pub total_count: u64,
    pub has_previous: bool,
    pub has_next: bool,
    pub previous_page_number: Option<u32>,
    pub next_page_number: Option<u32>,
}

impl PageInfo {
    pub fn limit(&self) -> u32 {
        self.per_page
    }

    pub fn offset(&self) -> u32 {
        (self.number - 1) * self.per_page
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    #[serde(flatten)]
    pub info: PageInfo,
}

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    per_page: u32,
    total_count: u64,
}

impl Paginator {
    pub fn new(per_page: u32, total_count: u64) -> Self {
        Paginator { per_page: per_page.max(1), total_count }
    }

    /// An empty result still has one (empty) page.
    pub fn num_pages(&self) -> u32 {
        let per_page = u64::from(self.per_page);
        let pages = (self.total_count + per_page - 1) / per_page;
        pages.clamp(1, u64::from(u32::MAX)) as u32
    }

    /// Resolves a raw `?page=` value; anything unusable lands on the nearest valid page.
    pub fn get_page(&self, raw: Option<&str>) -> PageInfo {
        let num_pages = self.num_pages();
        let number = match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => 1,
            Some("last") => num_pages,
            Some(s) => match s.parse::<i64>() {
                Ok(n) if n < 1 => 1,
                Ok(n) => n.min(i64::from(num_pages)) as u32,
                // Digits too large for i64 are still past the end.
                Err(_) if s.bytes().all(|b| b.is_ascii_digit()) => num_pages,
                Err(_) => 1,
            },
        };
        PageInfo {
            number,
            num_pages,
            per_page: self.per_page,
            total_count: self.total_count,
            has_previous: number > 1,
            has_next: number < num_pages,
            previous_page_number: (number > 1).then(|| number - 1),
            next_page_number: (number < num_pages).then(|| number + 1),
        }
    }
}

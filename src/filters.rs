use url::form_urlencoded;

/// Default page number when the query carries none.
pub const DEFAULT_PAGE: u32 = 1;
/// Default page size when the query carries none.
pub const DEFAULT_LIMIT: u32 = 12;

// ============ Enumerated filter values ============

/// Finishing level of a unit. Unknown query values are silently treated as
/// unset rather than rejected with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finishing {
    Finished,
    SemiFinished,
    CoreAndShell,
    FullyFurnished,
}

impl Finishing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Finishing::Finished => "finished",
            Finishing::SemiFinished => "semi_finished",
            Finishing::CoreAndShell => "core_and_shell",
            Finishing::FullyFurnished => "fully_furnished",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "finished" => Some(Finishing::Finished),
            "semi_finished" => Some(Finishing::SemiFinished),
            "core_and_shell" => Some(Finishing::CoreAndShell),
            "fully_furnished" => Some(Finishing::FullyFurnished),
            _ => None,
        }
    }
}

/// Listing availability status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingStatus {
    Available,
    Reserved,
    Sold,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Available => "available",
            ListingStatus::Reserved => "reserved",
            ListingStatus::Sold => "sold",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "available" => Some(ListingStatus::Available),
            "reserved" => Some(ListingStatus::Reserved),
            "sold" => Some(ListingStatus::Sold),
            _ => None,
        }
    }
}

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Newest,
    PriceAsc,
    PriceDesc,
    AreaAsc,
    AreaDesc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Newest => "newest",
            SortOrder::PriceAsc => "price_asc",
            SortOrder::PriceDesc => "price_desc",
            SortOrder::AreaAsc => "area_asc",
            SortOrder::AreaDesc => "area_desc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "newest" => Some(SortOrder::Newest),
            "price_asc" => Some(SortOrder::PriceAsc),
            "price_desc" => Some(SortOrder::PriceDesc),
            "area_asc" => Some(SortOrder::AreaAsc),
            "area_desc" => Some(SortOrder::AreaDesc),
            _ => None,
        }
    }
}

// ============ Filter set ============

/// Sparse listing filter set. Absence of a field means "unset", not zero;
/// the canonical encoding is a URL query string.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSet {
    pub search: Option<String>,
    pub city: Option<String>,
    pub area: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub min_area: Option<u32>,
    pub max_area: Option<u32>,
    pub bedrooms: Option<u8>,
    pub bathrooms: Option<u8>,
    pub finishing: Option<Finishing>,
    pub tags: Vec<String>,
    pub status: Option<ListingStatus>,
    pub sort: Option<SortOrder>,
    pub page: u32,
    pub limit: u32,
}

impl Default for FilterSet {
    fn default() -> Self {
        Self {
            search: None,
            city: None,
            area: None,
            min_price: None,
            max_price: None,
            min_area: None,
            max_area: None,
            bedrooms: None,
            bathrooms: None,
            finishing: None,
            tags: Vec::new(),
            status: None,
            sort: None,
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Whitelist-driven query parse. Unknown keys are ignored, non-numeric
/// values for numeric fields and out-of-enum values are silently left unset,
/// empty values count as absent.
pub fn parse_filters(query: &str) -> FilterSet {
    let mut filters = FilterSet::default();
    for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
        if value.is_empty() {
            continue;
        }
        let value = value.as_ref();
        match key.as_ref() {
            "search" => filters.search = Some(value.to_string()),
            "city" => filters.city = Some(value.to_string()),
            "area" => filters.area = Some(value.to_string()),
            "min_price" => filters.min_price = value.parse().ok(),
            "max_price" => filters.max_price = value.parse().ok(),
            "min_area" => filters.min_area = value.parse().ok(),
            "max_area" => filters.max_area = value.parse().ok(),
            "bedrooms" => filters.bedrooms = value.parse().ok(),
            "bathrooms" => filters.bathrooms = value.parse().ok(),
            "finishing" => filters.finishing = Finishing::parse(value),
            "tags" => {
                filters.tags = value
                    .split(',')
                    .filter(|t| !t.is_empty())
                    .map(|t| t.to_string())
                    .collect()
            }
            "status" => filters.status = ListingStatus::parse(value),
            "sort" => filters.sort = SortOrder::parse(value),
            "page" => {
                if let Ok(page) = value.parse::<u32>() {
                    if page >= 1 {
                        filters.page = page;
                    }
                }
            }
            "limit" => {
                if let Ok(limit) = value.parse::<u32>() {
                    if limit >= 1 {
                        filters.limit = limit;
                    }
                }
            }
            _ => {}
        }
    }
    filters
}

impl FilterSet {
    /// Canonical query-string encoding. Defaults (`page=1`, `limit=12`) are
    /// omitted so a pristine filter set encodes to an empty query.
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        if let Some(ref v) = self.search {
            serializer.append_pair("search", v);
        }
        if let Some(ref v) = self.city {
            serializer.append_pair("city", v);
        }
        if let Some(ref v) = self.area {
            serializer.append_pair("area", v);
        }
        if let Some(v) = self.min_price {
            serializer.append_pair("min_price", &v.to_string());
        }
        if let Some(v) = self.max_price {
            serializer.append_pair("max_price", &v.to_string());
        }
        if let Some(v) = self.min_area {
            serializer.append_pair("min_area", &v.to_string());
        }
        if let Some(v) = self.max_area {
            serializer.append_pair("max_area", &v.to_string());
        }
        if let Some(v) = self.bedrooms {
            serializer.append_pair("bedrooms", &v.to_string());
        }
        if let Some(v) = self.bathrooms {
            serializer.append_pair("bathrooms", &v.to_string());
        }
        if let Some(v) = self.finishing {
            serializer.append_pair("finishing", v.as_str());
        }
        if !self.tags.is_empty() {
            serializer.append_pair("tags", &self.tags.join(","));
        }
        if let Some(v) = self.status {
            serializer.append_pair("status", v.as_str());
        }
        if let Some(v) = self.sort {
            serializer.append_pair("sort", v.as_str());
        }
        if self.page != DEFAULT_PAGE {
            serializer.append_pair("page", &self.page.to_string());
        }
        if self.limit != DEFAULT_LIMIT {
            serializer.append_pair("limit", &self.limit.to_string());
        }
        serializer.finish()
    }

    /// Number of active content filters. Pagination and sort keys are
    /// excluded: the count answers "how many content filters are active"
    /// and drives UI badges.
    pub fn active_filter_count(&self) -> usize {
        let mut count = 0;
        count += self.search.is_some() as usize;
        count += self.city.is_some() as usize;
        count += self.area.is_some() as usize;
        count += self.min_price.is_some() as usize;
        count += self.max_price.is_some() as usize;
        count += self.min_area.is_some() as usize;
        count += self.max_area.is_some() as usize;
        count += self.bedrooms.is_some() as usize;
        count += self.bathrooms.is_some() as usize;
        count += self.finishing.is_some() as usize;
        count += !self.tags.is_empty() as usize;
        count += self.status.is_some() as usize;
        count
    }
}

// ============ Mutations ============

/// One filter mutation. `None` (or an empty string, or an empty tag list)
/// clears the key.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterUpdate {
    Search(Option<String>),
    City(Option<String>),
    Area(Option<String>),
    MinPrice(Option<u64>),
    MaxPrice(Option<u64>),
    MinArea(Option<u32>),
    MaxArea(Option<u32>),
    Bedrooms(Option<u8>),
    Bathrooms(Option<u8>),
    Finishing(Option<Finishing>),
    Tags(Vec<String>),
    Status(Option<ListingStatus>),
    Sort(Option<SortOrder>),
    Page(u32),
    Limit(u32),
}

impl FilterUpdate {
    fn is_page_change(&self) -> bool {
        matches!(self, FilterUpdate::Page(_))
    }
}

/// Filter state with URL write-through semantics.
///
/// Every mutation returns the canonical query string for the embedder to
/// write into the address bar with *replace* history semantics, not push,
/// so filter churn never pollutes the back-stack.
#[derive(Debug, Clone)]
pub struct FilterState {
    current: FilterSet,
}

impl FilterState {
    pub fn from_query(query: &str) -> Self {
        Self {
            current: parse_filters(query),
        }
    }

    pub fn filters(&self) -> &FilterSet {
        &self.current
    }

    pub fn query(&self) -> String {
        self.current.to_query_string()
    }

    /// Applies a single mutation. Any change other than a page change resets
    /// `page` to 1.
    pub fn set(&mut self, update: FilterUpdate) -> String {
        let reset_page = !update.is_page_change();
        self.apply(update);
        if reset_page {
            self.current.page = DEFAULT_PAGE;
        }
        self.query()
    }

    /// Applies a multi-key patch. `page` resets to 1 unless the patch itself
    /// includes an explicit page change.
    pub fn set_many(&mut self, updates: Vec<FilterUpdate>) -> String {
        let has_explicit_page = updates.iter().any(|u| u.is_page_change());
        for update in updates {
            self.apply(update);
        }
        if !has_explicit_page {
            self.current.page = DEFAULT_PAGE;
        }
        self.query()
    }

    pub fn active_filter_count(&self) -> usize {
        self.current.active_filter_count()
    }

    fn apply(&mut self, update: FilterUpdate) {
        match update {
            FilterUpdate::Search(v) => self.current.search = normalize(v),
            FilterUpdate::City(v) => self.current.city = normalize(v),
            FilterUpdate::Area(v) => self.current.area = normalize(v),
            FilterUpdate::MinPrice(v) => self.current.min_price = v,
            FilterUpdate::MaxPrice(v) => self.current.max_price = v,
            FilterUpdate::MinArea(v) => self.current.min_area = v,
            FilterUpdate::MaxArea(v) => self.current.max_area = v,
            FilterUpdate::Bedrooms(v) => self.current.bedrooms = v,
            FilterUpdate::Bathrooms(v) => self.current.bathrooms = v,
            FilterUpdate::Finishing(v) => self.current.finishing = v,
            FilterUpdate::Tags(v) => {
                self.current.tags = v.into_iter().filter(|t| !t.is_empty()).collect()
            }
            FilterUpdate::Status(v) => self.current.status = v,
            FilterUpdate::Sort(v) => self.current.sort = v,
            FilterUpdate::Page(v) => self.current.page = v.max(1),
            FilterUpdate::Limit(v) => self.current.limit = v.max(1),
        }
    }
}

/// Empty strings clear the key instead of storing an empty value.
fn normalize(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

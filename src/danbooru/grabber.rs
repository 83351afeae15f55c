use clap::ValueEnum;

use crate::danbooru::sender::{PostEntry, SenderResult};
use crate::danbooru::styled_tag;

/// Fixed upper bound the search endpoint enforces per page.
pub(crate) const POSTS_PER_PAGE: u64 = 200;

/// Content ratings recognized by the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Rating {
    General,
    Sensitive,
    Questionable,
    Explicit,
}

impl Rating {
    /// Short form used inside the search expression.
    fn as_metatag_value(self) -> &'static str {
        match self {
            Rating::General => "g",
            Rating::Sensitive => "s",
            Rating::Questionable => "q",
            Rating::Explicit => "e",
        }
    }
}

/// Immutable description of one search run.
#[derive(Debug, Clone)]
pub(crate) struct SearchQuery {
    tag: String,
    rating: Option<Rating>,
    limit: Option<u64>,
    id_above: u32,
}

impl SearchQuery {
    pub(crate) fn new(
        tag: String,
        rating: Option<Rating>,
        limit: Option<u64>,
        id_above: u32,
    ) -> Self {
        SearchQuery {
            tag,
            rating,
            limit,
            id_above,
        }
    }

    pub(crate) fn tag(&self) -> &str {
        &self.tag
    }

    /// Builds the `+`-joined expression the search endpoint expects.
    ///
    /// A positive id floor adds `id:>N` together with ascending id order, so
    /// an interrupted run resumes exactly where the mirror stops.
    pub(crate) fn expression(&self) -> String {
        let mut expression = self.tag.clone();
        if let Some(rating) = self.rating {
            expression.push_str("+rating:");
            expression.push_str(rating.as_metatag_value());
        }
        if self.id_above > 0 {
            expression.push_str(&format!("+id:>{}+order:id", self.id_above));
        }
        expression
    }
}

/// What one page request asks of the search endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageRequest {
    pub(crate) tags: String,
    pub(crate) limit: u64,
    pub(crate) page: u64,
}

/// Remote search surface the grabber paginates over.
pub(crate) trait SearchClient {
    fn tag_post_count(&self, tag: &str) -> SenderResult<u64>;
    fn search_page(&self, request: &PageRequest) -> SenderResult<Vec<PostEntry>>;
}

/// Pulls every post matching a query, one page at a time.
pub(crate) struct Grabber<C> {
    sender: C,
}

impl<C: SearchClient> Grabber<C> {
    pub(crate) fn new(sender: C) -> Self {
        Grabber { sender }
    }

    /// Accumulates posts page by page until the target count is reached or
    /// the remote runs dry.
    ///
    /// Pages run strictly in order: a failed page is logged and skipped, an
    /// empty page ends the search. Only the tag count lookup of an
    /// unbounded run can fail the grab as a whole.
    pub(crate) fn grab_posts(&self, query: &SearchQuery) -> SenderResult<Vec<PostEntry>> {
        let target = match query.limit {
            Some(limit) if limit > 0 => limit,
            // The count ignores any id floor; overshoot ends at the first
            // empty page.
            _ => self.sender.tag_post_count(query.tag())?,
        };
        if target == 0 {
            info!("Nothing to grab: no posts match {}.", styled_tag(query.tag()));
            return Ok(Vec::new());
        }

        let expression = query.expression();
        let page_count = target.div_ceil(POSTS_PER_PAGE);
        let mut posts: Vec<PostEntry> = Vec::new();
        for page in 1..=page_count {
            // The final page asks for exactly the remainder, never a full
            // page.
            let page_limit = if page == page_count {
                target - POSTS_PER_PAGE * (page_count - 1)
            } else {
                POSTS_PER_PAGE
            };
            let request = PageRequest {
                tags: expression.clone(),
                limit: page_limit,
                page,
            };
            let batch = match self.sender.search_page(&request) {
                Ok(batch) => batch,
                Err(error) => {
                    warn!("Skipping page {page}: {error}");
                    continue;
                }
            };
            if batch.is_empty() {
                trace!("Page {page} came back empty; the remote is exhausted.");
                break;
            }
            posts.extend(batch);
            info!("Grabbed {} of {} posts...", posts.len(), target);
        }

        if (posts.len() as u64) < target {
            info!(
                "Search for {} finished with {} of {} posts.",
                styled_tag(query.tag()),
                posts.len(),
                target
            );
        } else {
            info!("{} grabbed! ({} posts)", styled_tag(query.tag()), posts.len());
        }
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use reqwest::StatusCode;
    use serde_json::Map;

    use crate::danbooru::sender::SenderError;

    enum FakePage {
        Posts(Vec<PostEntry>),
        Fail,
    }

    struct ScriptedSearch {
        count: u64,
        pages: Vec<FakePage>,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl ScriptedSearch {
        fn new(count: u64, pages: Vec<FakePage>) -> Self {
            ScriptedSearch {
                count,
                pages,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<PageRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl SearchClient for &ScriptedSearch {
        fn tag_post_count(&self, _tag: &str) -> SenderResult<u64> {
            Ok(self.count)
        }

        fn search_page(&self, request: &PageRequest) -> SenderResult<Vec<PostEntry>> {
            self.requests.lock().unwrap().push(request.clone());
            match self.pages.get(request.page as usize - 1) {
                Some(FakePage::Posts(posts)) => Ok(posts.clone()),
                Some(FakePage::Fail) => Err(SenderError::Status {
                    url: "http://scripted.test".to_string(),
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                }),
                None => Ok(Vec::new()),
            }
        }
    }

    fn posts<I: IntoIterator<Item = u32>>(ids: I) -> Vec<PostEntry> {
        ids.into_iter()
            .map(|id| PostEntry {
                id: Some(id),
                file_url: Some(format!("http://files.test/{id}.jpg")),
                file_ext: Some("jpg".to_string()),
                tag_string: Some("sky cloud".to_string()),
                rating: Some("g".to_string()),
                extra: Map::new(),
            })
            .collect()
    }

    #[test]
    fn limit_450_requests_three_pages_sized_200_200_50() {
        let search = ScriptedSearch::new(
            0,
            vec![
                FakePage::Posts(posts(1..201)),
                FakePage::Posts(posts(201..401)),
                FakePage::Posts(posts(401..451)),
            ],
        );
        let grabber = Grabber::new(&search);
        let query = SearchQuery::new("landscape".to_string(), None, Some(450), 0);

        let grabbed = grabber.grab_posts(&query).unwrap();

        assert_eq!(grabbed.len(), 450);
        let requests = search.requests();
        let limits: Vec<u64> = requests.iter().map(|r| r.limit).collect();
        assert_eq!(limits, [200, 200, 50]);
        let pages: Vec<u64> = requests.iter().map(|r| r.page).collect();
        assert_eq!(pages, [1, 2, 3]);
    }

    #[test]
    fn an_empty_page_ends_the_grab_early() {
        let search = ScriptedSearch::new(
            0,
            vec![FakePage::Posts(posts(1..201)), FakePage::Posts(Vec::new())],
        );
        let grabber = Grabber::new(&search);
        let query = SearchQuery::new("landscape".to_string(), None, Some(250), 0);

        let grabbed = grabber.grab_posts(&query).unwrap();

        assert_eq!(grabbed.len(), 200);
        assert_eq!(search.requests().len(), 2);
    }

    #[test]
    fn a_failed_page_is_skipped_not_fatal() {
        let search = ScriptedSearch::new(
            0,
            vec![
                FakePage::Posts(posts(1..201)),
                FakePage::Fail,
                FakePage::Posts(posts(401..451)),
            ],
        );
        let grabber = Grabber::new(&search);
        let query = SearchQuery::new("landscape".to_string(), None, Some(450), 0);

        let grabbed = grabber.grab_posts(&query).unwrap();

        assert_eq!(grabbed.len(), 250);
        assert_eq!(search.requests().len(), 3);
    }

    #[test]
    fn an_unknown_tag_grabs_nothing() {
        let search = ScriptedSearch::new(0, vec![FakePage::Posts(posts(1..10))]);
        let grabber = Grabber::new(&search);
        let query = SearchQuery::new("no_such_tag".to_string(), None, None, 0);

        assert!(grabber.grab_posts(&query).unwrap().is_empty());
        assert!(search.requests().is_empty());
    }

    #[test]
    fn unbounded_grabs_size_themselves_from_the_tag_count() {
        let search = ScriptedSearch::new(
            250,
            vec![
                FakePage::Posts(posts(1..201)),
                FakePage::Posts(posts(201..251)),
            ],
        );
        let grabber = Grabber::new(&search);
        let query = SearchQuery::new("landscape".to_string(), None, None, 0);

        let grabbed = grabber.grab_posts(&query).unwrap();

        assert_eq!(grabbed.len(), 250);
        let limits: Vec<u64> = search.requests().iter().map(|r| r.limit).collect();
        assert_eq!(limits, [200, 50]);
    }

    #[test]
    fn server_order_is_preserved() {
        let search = ScriptedSearch::new(0, vec![FakePage::Posts(posts([3, 1, 2]))]);
        let grabber = Grabber::new(&search);
        let query = SearchQuery::new("landscape".to_string(), None, Some(3), 0);

        let grabbed = grabber.grab_posts(&query).unwrap();
        let ids: Vec<u32> = grabbed.iter().filter_map(|post| post.id).collect();
        assert_eq!(ids, [3, 1, 2]);
    }

    #[test]
    fn expressions_carry_rating_and_resume_clauses() {
        let plain = SearchQuery::new("landscape".to_string(), None, None, 0);
        assert_eq!(plain.expression(), "landscape");

        let rated = SearchQuery::new("landscape".to_string(), Some(Rating::Explicit), None, 0);
        assert_eq!(rated.expression(), "landscape+rating:e");

        let resumed = SearchQuery::new("landscape".to_string(), Some(Rating::General), None, 12);
        assert_eq!(resumed.expression(), "landscape+rating:g+id:>12+order:id");
    }
}

//! Token-driven pagination as a lazy record stream

use futures_util::{StreamExt, TryStreamExt, stream};
use resviz_cloud::{FetchError, RecordStream, ResourceRecord};
use std::future::Future;

/// One page of records plus the token for the next page
pub(crate) type Page = (Vec<ResourceRecord>, Option<String>);

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Turn a page-fetching closure into a record stream
///
/// `fetch_page` receives `None` for the first page and the previous page's
/// token afterwards. A missing or empty token ends the listing. Pages are
/// only requested as the stream is polled.
pub(crate) fn paginate<'a, F, Fut>(fetch_page: F) -> RecordStream<'a>
where
    F: Fn(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page, FetchError>> + Send + 'a,
{
    stream::try_unfold(Cursor::Start, move |cursor| {
        let request = match cursor {
            Cursor::Start => Some(fetch_page(None)),
            Cursor::Next(token) => Some(fetch_page(Some(token))),
            Cursor::Done => None,
        };

        async move {
            let Some(request) = request else {
                return Ok::<_, FetchError>(None);
            };
            let (records, next) = request.await?;
            let cursor = match next {
                Some(token) if !token.is_empty() => Cursor::Next(token),
                _ => Cursor::Done,
            };
            Ok(Some((records, cursor)))
        }
    })
    .map_ok(|records| stream::iter(records.into_iter().map(Ok::<_, FetchError>)))
    .try_flatten()
    .boxed()
}

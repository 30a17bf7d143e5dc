// GNU AGPL v3 License

use super::PlaylistEntry;
use quick_xml::events::{attributes::Attribute, BytesEnd, BytesStart, Event};
use std::iter;

/// XML events that are used to represent a playlist.
pub(super) fn playlist_xml<'a>(
    entries: impl Iterator<Item = PlaylistEntry<'a>>,
    id: &'a str,
) -> impl Iterator<Item = Event<'a>> {
    let start = Event::Start(
        BytesStart::borrowed_name(b"playlist").with_attributes(iter::once(Attribute::from(("id", id)))),
    );

    let items = entries.map(|entry| {
        Event::Empty(BytesStart::borrowed_name(b"entry").with_attributes([
            Attribute::from(("producer", entry.producer)),
            Attribute {
                key: b"in",
                value: entry.start.to_string().into_bytes().into(),
            },
            Attribute {
                key: b"out",
                value: entry.end.to_string().into_bytes().into(),
            },
        ]))
    });

    let end = Event::End(BytesEnd::borrowed(b"playlist"));

    iter::once(start).chain(items).chain(iter::once(end))
}

// GNU AGPL v3 License

//! MLT documents describing the remix, rendered with the `melt` program.

use crate::plan::{AssemblyPlan, ClipSpec};
use anyhow::{anyhow, Result};
use camino::Utf8Path;
use quick_xml::{
    events::{attributes::Attribute, BytesDecl, BytesEnd, BytesStart, Event},
    Writer,
};
use std::{fs, io, path::Path};

mod playlist;
mod producer;
mod render;
mod tractor;

pub(crate) use render::render;

const SOURCE_ID: &str = "source";
const PLAYLIST_ID: &str = "remix";
const TRACTOR_ID: &str = "main";

/// Frame geometry of the output.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Profile {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) fps: f64,
}

/// An in-progress MELT input file.
pub(crate) struct Melt<'a> {
    path: &'a Utf8Path,
    root: &'a Utf8Path,
    output_path: &'a Utf8Path,
    events: Vec<Event<'a>>,
    profile: Profile,
    duration: i64,
}

impl<'a> Melt<'a> {
    /// Create a new Melt input file.
    pub(crate) fn new(
        path: &'a Path,
        output_path: &'a Path,
        profile: Profile,
        duration: i64,
    ) -> Result<Self> {
        let path: &Utf8Path = path.try_into()?;
        let root = path
            .parent()
            .ok_or_else(|| anyhow!("{} has no parent directory", path))?;

        Ok(Self {
            path,
            root,
            output_path: output_path.try_into()?,
            events: Vec::new(),
            profile,
            duration,
        })
    }

    /// Add a new producer to the file.
    pub(crate) fn producer(&mut self, resource: &'a Path, id: &'a str) -> Result<()> {
        self.events
            .extend(producer::producer_xml(resource.try_into()?, id));
        Ok(())
    }

    /// Add a new playlist to the file.
    pub(crate) fn playlist(
        &mut self,
        entries: impl IntoIterator<Item = PlaylistEntry<'a>>,
        id: &'a str,
    ) {
        self.events
            .extend(playlist::playlist_xml(entries.into_iter(), id));
    }

    /// Add a new tractor to the file.
    pub(crate) fn tractor(&mut self, multitrack: impl IntoIterator<Item = &'a str>, id: &'a str) {
        self.events
            .extend(tractor::tractor_xml(multitrack.into_iter(), id));
    }

    /// Convert the file to the final XML events.
    fn into_events(self, main_tractor: &'a str) -> impl Iterator<Item = Event<'a>> {
        const FRAME_RATE_DENOMINATOR: u64 = 1_000_000;

        // mlt opener and closer
        let opener = Event::Start(BytesStart::borrowed_name(b"mlt").with_attributes([
            Attribute::from(("title", "quietcut remix")),
            Attribute::from(("producer", main_tractor)),
            Attribute::from(("root", self.root.as_str())),
        ]));
        let closer = Event::End(BytesEnd::borrowed(b"mlt"));

        // profile description
        let numerator = (self.profile.fps * FRAME_RATE_DENOMINATOR as f64).round() as u64;
        let profile = Event::Empty(BytesStart::borrowed_name(b"profile").with_attributes([
            number(b"width", self.profile.width),
            number(b"height", self.profile.height),
            number(b"frame_rate_num", numerator),
            number(b"frame_rate_den", FRAME_RATE_DENOMINATOR),
            number(b"progressive", 1),
        ]));

        // consumer for the end result
        let consumer = Event::Empty(BytesStart::borrowed_name(b"consumer").with_attributes([
            Attribute::from(("f", container_format(self.output_path.extension()))),
            Attribute::from(("target", self.output_path.as_str())),
            number(b"in", 0),
            number(b"out", (self.duration - 1).max(0)),
            Attribute::from(("mlt_service", "avformat")),
        ]));

        let decl = Event::Decl(BytesDecl::new(b"1.0", Some(b"utf-8"), None));

        [decl, opener, profile, consumer]
            .into_iter()
            .chain(self.events.into_iter())
            .chain(Some(closer))
    }

    /// Write the XML events to any writer.
    pub(crate) fn to_writer<W: io::Write>(self, main_tractor: &'a str, out: W) -> Result<()> {
        let mut writer = Writer::new(out);
        self.into_events(main_tractor)
            .try_for_each(|event| writer.write_event(event))?;
        Ok(())
    }

    /// Write the XML events to a file.
    pub(crate) async fn write_file(self, main_tractor: &'a str) -> Result<()> {
        let out_path = self.path;

        tokio::task::block_in_place(move || {
            let file = fs::File::create(out_path.as_std_path())?;
            self.to_writer(main_tractor, io::BufWriter::new(file))
        })
    }
}

/// An entry in a playlist, with inclusive frame numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlaylistEntry<'a> {
    pub(crate) producer: &'a str,
    pub(crate) start: i64,
    pub(crate) end: i64,
}

/// Describe the plan as a single playlist over the source video.
pub(crate) fn remix_document<'a>(
    mlt_path: &'a Path,
    source: &'a Path,
    output_path: &'a Path,
    plan: &AssemblyPlan,
    profile: Profile,
) -> Result<Melt<'a>> {
    let entries = plan
        .clips()
        .iter()
        .map(|clip| clip_entry(clip, profile.fps))
        .collect::<Vec<_>>();
    let duration = entries.iter().map(|e| e.end - e.start + 1).sum();

    let mut melt = Melt::new(mlt_path, output_path, profile, duration)?;
    melt.producer(source, SOURCE_ID)?;
    melt.playlist(entries, PLAYLIST_ID);
    melt.tractor([PLAYLIST_ID], TRACTOR_ID);

    tracing::debug!("Remix document spans {} frames", duration);
    Ok(melt)
}

pub(crate) fn main_tractor() -> &'static str {
    TRACTOR_ID
}

/// Map a clip's seconds onto the frames of the source.
fn clip_entry(clip: &ClipSpec, fps: f64) -> PlaylistEntry<'static> {
    let start = (clip.start * fps).round() as i64;
    let end = ((clip.end * fps).round() as i64 - 1).max(start);

    PlaylistEntry {
        producer: SOURCE_ID,
        start,
        end,
    }
}

/// The avformat muxer name for an output extension.
fn container_format(extension: Option<&str>) -> &'static str {
    match extension.map(str::to_ascii_lowercase).as_deref() {
        Some("mp4" | "m4v") => "mp4",
        Some("mov") => "mov",
        Some("mkv") => "matroska",
        Some("avi") => "avi",
        Some("ts") => "mpegts",
        _ => "webm",
    }
}

fn number<'a>(key: &'a [u8], value: impl ToString) -> Attribute<'a> {
    Attribute {
        key,
        value: value.to_string().into_bytes().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        plan::assemble,
        segment::{Segment, SegmentList},
        select::Selection,
    };
    use std::path::PathBuf;

    fn document(plan: &AssemblyPlan) -> String {
        let mlt = PathBuf::from("/tmp/quietcut/remix.mlt");
        let source = PathBuf::from("/videos/in & out.mp4");
        let output = PathBuf::from("/videos/.remix.mkv.0.part.mkv");
        let profile = Profile {
            width: 1280,
            height: 720,
            fps: 25.0,
        };

        let mut buf = Vec::new();
        remix_document(&mlt, &source, &output, plan, profile)
            .unwrap()
            .to_writer(main_tractor(), &mut buf)
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn plan() -> AssemblyPlan {
        let segments = SegmentList::new(
            vec![
                Segment { start: 0, end: 199 },
                Segment { start: 200, end: 399 },
                Segment { start: 400, end: 599 },
            ],
            100,
        );
        let selection = Selection {
            draws: vec![1, 1],
            accepted: vec![1],
            duration: 0.0,
        };
        assemble(&segments, &selection)
    }

    #[test]
    fn clips_become_frame_entries() {
        let xml = document(&plan());
        assert!(xml.contains(r#"<entry producer="source" in="0" out="49"/>"#));
        assert!(xml.contains(r#"<entry producer="source" in="50" out="99"/>"#));
        assert!(xml.contains(r#"<entry producer="source" in="100" out="149"/>"#));
    }

    #[test]
    fn consumer_covers_whole_playlist() {
        let xml = document(&plan());
        assert!(xml.contains(r#"f="matroska""#));
        assert!(xml.contains(r#"in="0" out="149" mlt_service="avformat""#));
        assert!(xml.contains(r#"frame_rate_num="25000000" frame_rate_den="1000000""#));
    }

    #[test]
    fn paths_are_escaped() {
        let xml = document(&plan());
        assert!(xml.contains("/videos/in &amp; out.mp4"));
        assert!(xml.contains(r#"root="/tmp/quietcut""#));
    }

    #[test]
    fn tractor_plays_the_remix() {
        let xml = document(&plan());
        assert!(xml.contains(r#"<mlt title="quietcut remix" producer="main""#));
        assert!(xml.contains(r#"<track producer="remix"/>"#));
    }

    #[test]
    fn unknown_extensions_fall_back_to_webm() {
        assert_eq!(container_format(Some("MP4")), "mp4");
        assert_eq!(container_format(Some("xyz")), "webm");
        assert_eq!(container_format(None), "webm");
    }
}

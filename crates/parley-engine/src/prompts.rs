//! Prompt templates.
//!
//! Every template the pipelines use is a variant of [`Prompt`] carrying its own
//! parameter struct, so a template cannot be rendered with a parameter missing.
//! Rendering is pure string assembly.

use std::fmt;

/// Name of a template, as shown in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TemplateId {
    DialogueSummary,
    DialogueOutline,
    StructuredOutline,
    SegmentWithReferences,
    SegmentNoReferences,
    SegmentToDialogue,
    CombineDialogues,
    DialogueTranscript,
    MonologueSummary,
    MonologueOutline,
    MonologueDraft,
    MonologueTranscript,
}

impl TemplateId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DialogueSummary => "dialogue_summary",
            Self::DialogueOutline => "dialogue_outline",
            Self::StructuredOutline => "structured_outline",
            Self::SegmentWithReferences => "segment_with_references",
            Self::SegmentNoReferences => "segment_no_references",
            Self::SegmentToDialogue => "segment_to_dialogue",
            Self::CombineDialogues => "combine_dialogues",
            Self::DialogueTranscript => "dialogue_transcript",
            Self::MonologueSummary => "monologue_summary",
            Self::MonologueOutline => "monologue_outline",
            Self::MonologueDraft => "monologue_draft",
            Self::MonologueTranscript => "monologue_transcript",
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SummaryParams<'a> {
    pub text: &'a str,
}

/// A summarized document as it appears inside outline prompts.
#[derive(Clone, Copy, Debug)]
pub struct DocumentDigest<'a> {
    pub filename: &'a str,
    pub label: &'a str,
    pub summary: &'a str,
}

#[derive(Clone, Copy, Debug)]
pub struct DialogueOutlineParams<'a> {
    pub total_duration: u32,
    pub focus: Option<&'a str>,
    pub documents: &'a [DocumentDigest<'a>],
}

#[derive(Clone, Copy, Debug)]
pub struct StructuredOutlineParams<'a> {
    pub outline: &'a str,
    pub schema: &'a str,
    pub valid_filenames: &'a [String],
}

#[derive(Clone, Copy, Debug)]
pub struct SegmentParams<'a> {
    pub duration: u32,
    pub topic: &'a str,
    pub angles: &'a str,
    /// Joined text of the referenced documents. `None` selects the no-reference form.
    pub text: Option<&'a str>,
}

#[derive(Clone, Copy, Debug)]
pub struct SegmentToDialogueParams<'a> {
    pub text: &'a str,
    pub duration: u32,
    pub descriptions: &'a str,
    pub speaker_1: &'a str,
    pub speaker_2: &'a str,
}

#[derive(Clone, Copy, Debug)]
pub struct CombineDialoguesParams<'a> {
    pub outline: &'a str,
    pub dialogue_transcript: &'a str,
    pub next_section: &'a str,
    pub current_section: &'a str,
}

#[derive(Clone, Copy, Debug)]
pub struct DialogueTranscriptParams<'a> {
    pub speaker_1: &'a str,
    pub speaker_2: &'a str,
    pub text: &'a str,
    pub schema: &'a str,
}

#[derive(Clone, Copy, Debug)]
pub struct MonologueOutlineParams<'a> {
    pub focus: Option<&'a str>,
    pub documents: &'a [DocumentDigest<'a>],
}

#[derive(Clone, Copy, Debug)]
pub struct MonologueDraftParams<'a> {
    pub raw_outline: &'a str,
    pub documents: &'a [String],
    pub focus: &'a str,
    pub speaker_1: &'a str,
}

#[derive(Clone, Copy, Debug)]
pub struct MonologueTranscriptParams<'a> {
    pub speaker_1: &'a str,
    pub text: &'a str,
    pub schema: &'a str,
}

/// Focus used by the monologue draft when the request carries no guide.
pub const DEFAULT_MONOLOGUE_FOCUS: &str = "key financial metrics and performance indicators";

#[derive(Clone, Copy, Debug)]
pub enum Prompt<'a> {
    DialogueSummary(SummaryParams<'a>),
    DialogueOutline(DialogueOutlineParams<'a>),
    StructuredOutline(StructuredOutlineParams<'a>),
    Segment(SegmentParams<'a>),
    SegmentToDialogue(SegmentToDialogueParams<'a>),
    CombineDialogues(CombineDialoguesParams<'a>),
    DialogueTranscript(DialogueTranscriptParams<'a>),
    MonologueSummary(SummaryParams<'a>),
    MonologueOutline(MonologueOutlineParams<'a>),
    MonologueDraft(MonologueDraftParams<'a>),
    MonologueTranscript(MonologueTranscriptParams<'a>),
}

impl Prompt<'_> {
    pub fn id(&self) -> TemplateId {
        match self {
            Self::DialogueSummary(_) => TemplateId::DialogueSummary,
            Self::DialogueOutline(_) => TemplateId::DialogueOutline,
            Self::StructuredOutline(_) => TemplateId::StructuredOutline,
            Self::Segment(p) if p.text.is_some() => TemplateId::SegmentWithReferences,
            Self::Segment(_) => TemplateId::SegmentNoReferences,
            Self::SegmentToDialogue(_) => TemplateId::SegmentToDialogue,
            Self::CombineDialogues(_) => TemplateId::CombineDialogues,
            Self::DialogueTranscript(_) => TemplateId::DialogueTranscript,
            Self::MonologueSummary(_) => TemplateId::MonologueSummary,
            Self::MonologueOutline(_) => TemplateId::MonologueOutline,
            Self::MonologueDraft(_) => TemplateId::MonologueDraft,
            Self::MonologueTranscript(_) => TemplateId::MonologueTranscript,
        }
    }

    pub fn render(&self) -> String {
        match self {
            Self::DialogueSummary(p) => dialogue_summary(p),
            Self::DialogueOutline(p) => dialogue_outline(p),
            Self::StructuredOutline(p) => structured_outline(p),
            Self::Segment(p) => segment(p),
            Self::SegmentToDialogue(p) => segment_to_dialogue(p),
            Self::CombineDialogues(p) => combine_dialogues(p),
            Self::DialogueTranscript(p) => dialogue_transcript(p),
            Self::MonologueSummary(p) => monologue_summary(p),
            Self::MonologueOutline(p) => monologue_outline(p),
            Self::MonologueDraft(p) => monologue_draft(p),
            Self::MonologueTranscript(p) => monologue_transcript(p),
        }
    }
}

fn dialogue_summary(p: &SummaryParams<'_>) -> String {
    format!(
        "Please provide a comprehensive summary of the document below. Capture its key \
         points, arguments, figures and conclusions so the summary can be used to plan \
         a podcast discussion about it.\n\n\
         <document>\n{}\n</document>\n\n\
         Respond with the summary only.",
        p.text
    )
}

fn monologue_summary(p: &SummaryParams<'_>) -> String {
    format!(
        "Summarize the document below for a single-presenter briefing. Focus on concrete \
         facts, metrics and trends. Keep every number exactly as written.\n\n\
         <document>\n{}\n</document>\n\n\
         Respond with the summary only.",
        p.text
    )
}

fn focus_block(focus: Option<&str>) -> String {
    match focus {
        Some(focus) => format!("Focus the discussion on the following:\n{focus}\n\n"),
        None => String::new(),
    }
}

fn dialogue_outline(p: &DialogueOutlineParams<'_>) -> String {
    let documents: String = p
        .documents
        .iter()
        .map(|d| {
            format!(
                "<document>\n<type>{}</type>\n<path>{}</path>\n<summary>\n{}\n</summary>\n</document>\n",
                d.label, d.filename, d.summary
            )
        })
        .collect();

    format!(
        "Create an outline for a {duration} minute podcast discussing the documents \
         below. Split the episode into segments. For each segment give a section title, \
         its duration in minutes, the topics and talking points it covers, and the paths \
         of the documents it draws on. Target documents are the main subject; context \
         documents only support them. Segment durations must add up to {duration} \
         minutes.\n\n\
         {focus}\
         {documents}",
        duration = p.total_duration,
        focus = focus_block(p.focus),
        documents = documents,
    )
}

fn structured_outline(p: &StructuredOutlineParams<'_>) -> String {
    let filenames = p
        .valid_filenames
        .iter()
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Convert the podcast outline below into JSON matching this schema:\n\
         {schema}\n\n\
         The references of each segment may only use these filenames:\n\
         {filenames}\n\n\
         <outline>\n{outline}\n</outline>\n\n\
         Respond with the JSON object only.",
        schema = p.schema,
        filenames = filenames,
        outline = p.outline,
    )
}

fn segment(p: &SegmentParams<'_>) -> String {
    let source = match p.text {
        Some(text) => format!(
            "Ground the segment in these source documents:\n<documents>\n{text}\n</documents>\n\n"
        ),
        None => "No source document is attached to this segment. Draw on the rest of the \
                 episode and general knowledge of the subject.\n\n"
            .to_string(),
    };

    format!(
        "Write the detailed content of a {duration} minute podcast segment on \"{topic}\". \
         Cover these angles:\n{angles}\n\n\
         {source}\
         Write flowing prose that two hosts could discuss. Keep facts and figures exact.",
        duration = p.duration,
        topic = p.topic,
        angles = p.angles,
        source = source,
    )
}

fn segment_to_dialogue(p: &SegmentToDialogueParams<'_>) -> String {
    format!(
        "Turn the segment below into a natural {duration} minute conversation between \
         {s1} and {s2}. {s1} leads the episode and {s2} asks questions, adds insight and \
         pushes back. The conversation must cover these topics:\n{descriptions}\n\n\
         <segment>\n{text}\n</segment>\n\n\
         Write each turn as \"Name: line\".",
        duration = p.duration,
        s1 = p.speaker_1,
        s2 = p.speaker_2,
        descriptions = p.descriptions,
        text = p.text,
    )
}

fn combine_dialogues(p: &CombineDialoguesParams<'_>) -> String {
    format!(
        "You are assembling a podcast episode segment by segment. The episode outline:\n\
         {outline}\n\n\
         The conversation so far:\n<conversation>\n{transcript}\n</conversation>\n\n\
         The next section to append:\n<next>\n{next}\n</next>\n\n\
         Merge the next section into the conversation. Add a smooth transition, remove \
         repetition and keep every turn of the existing conversation. The new section is \
         \"{current}\". Return the full merged conversation.",
        outline = p.outline,
        transcript = p.dialogue_transcript,
        next = p.next_section,
        current = p.current_section,
    )
}

fn dialogue_transcript(p: &DialogueTranscriptParams<'_>) -> String {
    format!(
        "Format the podcast conversation below as JSON matching this schema:\n\
         {schema}\n\n\
         Use \"speaker-1\" for every turn by {s1} and \"speaker-2\" for every turn by {s2}. \
         Put any planning notes in \"scratchpad\". Do not drop or invent turns.\n\n\
         <conversation>\n{text}\n</conversation>",
        schema = p.schema,
        s1 = p.speaker_1,
        s2 = p.speaker_2,
        text = p.text,
    )
}

fn monologue_outline(p: &MonologueOutlineParams<'_>) -> String {
    let documents = p
        .documents
        .iter()
        .map(|d| format!("Document: {}\n{}", d.filename, d.summary))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Synthesize the document summaries below into one outline for a single-presenter \
         briefing. Order the material from the most to the least important and keep the \
         figures exact.\n\n\
         {focus}\
         {documents}",
        focus = focus_block(p.focus),
        documents = documents,
    )
}

fn monologue_draft(p: &MonologueDraftParams<'_>) -> String {
    format!(
        "Write a monologue spoken by {speaker} that presents the outline below. Emphasize \
         {focus}. Sources: {documents}.\n\n\
         <outline>\n{outline}\n</outline>\n\n\
         Keep it conversational and grounded in the outline. Do not add other speakers.",
        speaker = p.speaker_1,
        focus = p.focus,
        documents = p.documents.join(", "),
        outline = p.raw_outline,
    )
}

fn monologue_transcript(p: &MonologueTranscriptParams<'_>) -> String {
    format!(
        "Format the monologue by {speaker} below as JSON matching this schema:\n\
         {schema}\n\n\
         Every line belongs to \"speaker-1\". Split the monologue into natural lines and \
         put any planning notes in \"scratchpad\".\n\n\
         <monologue>\n{text}\n</monologue>",
        speaker = p.speaker_1,
        schema = p.schema,
        text = p.text,
    )
}

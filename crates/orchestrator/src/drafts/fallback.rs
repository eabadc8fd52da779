use super::contract::{Draft, DraftSet, MAX_SUBJECT_CHARS};
use super::sanitize::{clamp_chars, sanitize_field};
use crate::models::Tone;

const QUICK_TYPE: &str = "Quick reply";
const STANDARD_TYPE: &str = "Standard reply";
const DETAILED_TYPE: &str = "Detailed reply";
const SUBJECT_WHEN_MISSING: &str = "your message";

struct CannedReplies {
    quick: &'static str,
    standard: &'static str,
    detailed: &'static str,
}

const fn canned_replies(tone: Tone) -> CannedReplies {
    match tone {
        Tone::Professional => CannedReplies {
            quick: "Thank you for your message. I have received it and will follow up shortly.",
            standard: "Thank you for reaching out. I have reviewed your message and will look into the points you raised. I will get back to you with a complete response as soon as possible.",
            detailed: "Thank you for your detailed message. I have gone through everything you shared and appreciate the context.\n\nI am reviewing the open points now and will follow up with a full response, including next steps and answers to your questions. If anything is time-sensitive, please let me know so I can prioritize it.\n\nBest regards",
        },
        Tone::Friendly => CannedReplies {
            quick: "Thanks so much for the note! I'll get back to you soon.",
            standard: "Thanks for reaching out! I've read through your message and I'm looking into everything you mentioned. I'll follow up with more soon.",
            detailed: "Thanks so much for the detailed message, it really helps to have all the context in one place.\n\nI'm working through the open points now and will get back to you with answers and next steps. If anything is urgent, just give me a shout and I'll look at it first.\n\nCheers",
        },
        Tone::Formal => CannedReplies {
            quick: "Thank you for your correspondence. I acknowledge receipt and will respond in due course.",
            standard: "Thank you for your correspondence. I have carefully reviewed the matters you raised and am giving them due consideration. You may expect a complete response shortly.",
            detailed: "Thank you for your comprehensive correspondence. I have reviewed its contents in full and appreciate the information provided.\n\nI am presently examining each of the outstanding matters and will respond formally with the relevant details and proposed next steps. Should any item require urgent attention, kindly advise me accordingly.\n\nYours sincerely",
        },
        Tone::Casual => CannedReplies {
            quick: "Got it, thanks! Will get back to you soon.",
            standard: "Hey, thanks for the message! I've had a look and I'm sorting through it now. I'll get back to you shortly.",
            detailed: "Hey, thanks for all the details!\n\nI'm going through everything now and I'll come back to you with answers and what happens next. If something can't wait, just ping me and I'll jump on it.\n\nTalk soon",
        },
    }
}

/// Three canned drafts for `tone`, ordered quick, standard, detailed. Used whenever
/// a capability's output does not pass validation.
pub fn synthesize_fallback(tone: Tone, thread_subject: &str) -> DraftSet {
    let replies = canned_replies(tone);
    let subject = reply_subject(thread_subject);

    DraftSet::new([
        canned_draft(QUICK_TYPE, &subject, replies.quick),
        canned_draft(STANDARD_TYPE, &subject, replies.standard),
        canned_draft(DETAILED_TYPE, &subject, replies.detailed),
    ])
}

pub fn reply_subject(thread_subject: &str) -> String {
    let subject = sanitize_field(thread_subject, MAX_SUBJECT_CHARS);
    if subject.is_empty() {
        return format!("Re: {SUBJECT_WHEN_MISSING}");
    }
    if subject.to_ascii_lowercase().starts_with("re:") {
        return subject;
    }

    clamp_chars(&format!("Re: {subject}"), MAX_SUBJECT_CHARS)
}

fn canned_draft(kind: &str, subject: &str, body: &str) -> Draft {
    Draft {
        r#type: kind.to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
    }
}

//! Coaching prompt construction

use std::fmt::Write as _;

use crate::types::{FeedbackLanguage, MetricSet};
use FeedbackLanguage::{En, Ko};

/// Transcript excerpt length (characters)
pub const TRANSCRIPT_PREVIEW_CHARS: usize = 500;

pub const WPM_TARGET_MIN: f64 = 140.0;
pub const WPM_TARGET_MAX: f64 = 180.0;

/// Qualitative band for the centered-gaze ratio
pub fn gaze_band(ratio: f64, lang: FeedbackLanguage) -> &'static str {
    match (lang, ratio) {
        (En, r) if r >= 0.7 => "excellent",
        (En, r) if r >= 0.5 => "average",
        (En, _) => "needs improvement",
        (Ko, r) if r >= 0.7 => "우수",
        (Ko, r) if r >= 0.5 => "보통",
        (Ko, _) => "개선 필요",
    }
}

pub fn smile_band(ratio: f64, lang: FeedbackLanguage) -> &'static str {
    match (lang, ratio) {
        (En, r) if r >= 0.25 => "natural",
        (En, r) if r >= 0.1 => "somewhat low",
        (En, _) => "needs improvement",
        (Ko, r) if r >= 0.25 => "자연스러움",
        (Ko, r) if r >= 0.1 => "다소 부족",
        (Ko, _) => "개선 필요",
    }
}

pub fn nod_band(nod_count: u32, lang: FeedbackLanguage) -> &'static str {
    match (lang, nod_count) {
        (En, 0) => "too few",
        (En, 1..=3) => "appropriate",
        (En, _) => "excessive",
        (Ko, 0) => "부족",
        (Ko, 1..=3) => "적절함",
        (Ko, _) => "과다",
    }
}

pub fn filler_band(filler_count: u32, lang: FeedbackLanguage) -> &'static str {
    match (lang, filler_count) {
        (En, 0..=5) => "appropriate",
        (En, 6..=10) => "somewhat frequent",
        (En, _) => "excessive",
        (Ko, 0..=5) => "적절",
        (Ko, 6..=10) => "다소 많음",
        (Ko, _) => "과다",
    }
}

/// Fixed prompt wording for one language
struct Labels {
    intro: &'static str,
    heading: &'static str,
    eye_contact: &'static str,
    gaze_share: &'static str,
    expression: &'static str,
    smile_share: &'static str,
    gestures: &'static str,
    nods: &'static str,
    count_unit: &'static str,
    rating: &'static str,
    emotion_heading: &'static str,
    primary_emotion: &'static str,
    distribution: &'static str,
    speaking: &'static str,
    speech_rate: &'static str,
    target: &'static str,
    fillers: &'static str,
    content: &'static str,
    guidelines: &'static str,
}

const EN_LABELS: Labels = Labels {
    intro: "You are an expert interview coach. Based on the analysis of a recorded interview \
answer below, give the candidate specific and practical feedback.",
    heading: "Nonverbal communication analysis:",
    eye_contact: "1. Eye contact",
    gaze_share: "Share of time looking at the camera",
    expression: "2. Facial expression",
    smile_share: "Share of smiling / positive frames",
    gestures: "3. Gestures",
    nods: "Head nods",
    count_unit: "",
    rating: "Rating",
    emotion_heading: "Emotion analysis:",
    primary_emotion: "Primary emotion",
    distribution: "Distribution",
    speaking: "4. Speaking pattern",
    speech_rate: "Speech rate",
    target: "Target",
    fillers: "Filler words",
    content: "5. Answer content (for reference):",
    guidelines: "Guidelines:\n\
1. Tone: encouraging, professional and specific.\n\
2. Structure: each item goes from observation to interpretation to a suggestion.\n\
3. Practicality: give tips the candidate can apply immediately.\n\
4. Positivity: mention strengths first and frame improvements constructively.\n\
5. Personalization: base every point on this candidate's numbers.\n\n\
Cover 5-7 items: eye contact, facial expression, gestures, speaking pace and rhythm, \
filler words, overall impression and strengths, and the top priority to improve.\n\
Write each item as 2-3 sentences of plain prose without bullets or numbering, \
and separate items with a blank line.\n\n\
Feedback:",
};

const KO_LABELS: Labels = Labels {
    intro: "당신은 면접 코칭 전문가입니다. 면접 영상 분석 결과를 바탕으로 지원자에게 \
구체적이고 실용적인 피드백을 제공해주세요.",
    heading: "비언어적 커뮤니케이션 분석 결과:",
    eye_contact: "1. 시선 처리",
    gaze_share: "카메라 응시 비율",
    expression: "2. 표정 관리",
    smile_share: "미소/긍정 표정 비율",
    gestures: "3. 제스처",
    nods: "고개 끄덕임 횟수",
    count_unit: "회",
    rating: "평가",
    emotion_heading: "감정 분석:",
    primary_emotion: "주요 감정",
    distribution: "감정 분포",
    speaking: "4. 말하기 패턴",
    speech_rate: "말 속도",
    target: "목표",
    fillers: "필러 사용",
    content: "5. 답변 내용 (참고용):",
    guidelines: "피드백 작성 가이드라인:\n\
1. 톤: 격려하면서도 전문적이고 구체적으로\n\
2. 구조: 각 피드백은 관찰, 해석, 개선 제안 순서로\n\
3. 실용성: 즉시 실천 가능한 구체적 팁 제공\n\
4. 긍정성: 강점을 먼저 언급하고, 개선점은 건설적으로\n\
5. 개인화: 이 지원자의 데이터를 기반으로 맞춤형 조언\n\n\
피드백 항목 (5-7개): 시선 처리, 표정 관리, 제스처와 자세, 말하기 속도와 리듬, \
필러 사용 개선, 전반적 인상 및 강점, 우선순위 개선 사항.\n\
각 피드백은 2-3문장의 평문으로, 불릿 포인트나 번호 없이 작성하고 \
빈 줄로 구분해주세요.\n\n\
피드백:",
};

fn labels(lang: FeedbackLanguage) -> &'static Labels {
    match lang {
        En => &EN_LABELS,
        Ko => &KO_LABELS,
    }
}

/// First 500 characters of the transcript, with `...` when cut
pub fn transcript_preview(transcript: &str) -> String {
    let transcript = transcript.trim();
    if transcript.chars().count() > TRANSCRIPT_PREVIEW_CHARS {
        let head: String = transcript.chars().take(TRANSCRIPT_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        transcript.to_string()
    }
}

/// Build the coaching prompt for a metric set and optional transcript
pub fn build_prompt(metrics: &MetricSet, transcript: Option<&str>, lang: FeedbackLanguage) -> String {
    let l = labels(lang);
    let mut summary = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(summary, "{}", l.heading);
    let _ = writeln!(summary);
    let _ = writeln!(summary, "{}", l.eye_contact);
    let _ = writeln!(
        summary,
        "   - {}: {:.1}%",
        l.gaze_share,
        metrics.center_gaze_ratio * 100.0
    );
    let _ = writeln!(summary, "   - {}: {}", l.rating, gaze_band(metrics.center_gaze_ratio, lang));
    let _ = writeln!(summary);
    let _ = writeln!(summary, "{}", l.expression);
    let _ = writeln!(summary, "   - {}: {:.1}%", l.smile_share, metrics.smile_ratio * 100.0);
    let _ = writeln!(summary, "   - {}: {}", l.rating, smile_band(metrics.smile_ratio, lang));
    let _ = writeln!(summary);
    let _ = writeln!(summary, "{}", l.gestures);
    let _ = writeln!(summary, "   - {}: {}{}", l.nods, metrics.nod_count, l.count_unit);
    let _ = writeln!(summary, "   - {}: {}", l.rating, nod_band(metrics.nod_count, lang));

    if !metrics.emotion_distribution.is_empty() {
        let distribution = metrics
            .emotion_distribution
            .iter()
            .map(|(emotion, ratio)| format!("{emotion} {:.0}%", ratio * 100.0))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(summary);
        let _ = writeln!(summary, "{}", l.emotion_heading);
        if let Some(primary) = metrics.primary_emotion {
            let _ = writeln!(summary, "   - {}: {primary}", l.primary_emotion);
        }
        let _ = writeln!(summary, "   - {}: {distribution}", l.distribution);
    }

    let _ = writeln!(summary);
    let _ = writeln!(summary, "{}", l.speaking);
    let _ = writeln!(summary, "   - {}: {:.0} WPM", l.speech_rate, metrics.wpm);
    let _ = writeln!(
        summary,
        "   - {}: {WPM_TARGET_MIN:.0}-{WPM_TARGET_MAX:.0} WPM",
        l.target
    );
    let _ = writeln!(
        summary,
        "   - {}: {}{} (um, uh, 음, 어, ...)",
        l.fillers, metrics.filler_count, l.count_unit
    );
    let _ = writeln!(summary, "   - {}: {}", l.rating, filler_band(metrics.filler_count, lang));

    if let Some(text) = transcript.filter(|t| !t.trim().is_empty()) {
        let _ = writeln!(summary);
        let _ = writeln!(summary, "{}", l.content);
        let _ = writeln!(summary, "```");
        let _ = writeln!(summary, "{}", transcript_preview(text));
        let _ = writeln!(summary, "```");
    }

    format!("{}\n\n{summary}\n{}", l.intro, l.guidelines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Emotion;
    use FeedbackLanguage::{En, Ko};
    use std::collections::BTreeMap;

    fn metrics() -> MetricSet {
        MetricSet {
            center_gaze_ratio: 0.72,
            smile_ratio: 0.12,
            smile_threshold_used: Some(0.6),
            nod_count: 4,
            emotion_distribution: BTreeMap::new(),
            primary_emotion: None,
            wpm: 162.4,
            filler_count: 7,
            metadata: None,
        }
    }

    #[test]
    fn test_bands() {
        assert_eq!(gaze_band(0.7, En), "excellent");
        assert_eq!(gaze_band(0.69, En), "average");
        assert_eq!(gaze_band(0.2, En), "needs improvement");
        assert_eq!(smile_band(0.25, En), "natural");
        assert_eq!(smile_band(0.1, En), "somewhat low");
        assert_eq!(nod_band(0, En), "too few");
        assert_eq!(nod_band(3, En), "appropriate");
        assert_eq!(nod_band(4, En), "excessive");
        assert_eq!(filler_band(5, En), "appropriate");
        assert_eq!(filler_band(10, En), "somewhat frequent");
        assert_eq!(filler_band(11, En), "excessive");
    }

    #[test]
    fn test_prompt_embeds_metrics() {
        let prompt = build_prompt(&metrics(), None, En);
        assert!(prompt.contains("72.0%"));
        assert!(prompt.contains("Head nods: 4"));
        assert!(prompt.contains("162 WPM"));
        assert!(prompt.contains("140-180 WPM"));
        assert!(!prompt.contains("Emotion analysis"));
        assert!(!prompt.contains("Answer content"));
        assert!(prompt.ends_with("Feedback:"));
    }

    #[test]
    fn test_prompt_emotion_block() {
        let mut m = metrics();
        m.emotion_distribution.insert(Emotion::Pleasant, 0.6);
        m.emotion_distribution.insert(Emotion::Neutral, 0.4);
        m.primary_emotion = Some(Emotion::Pleasant);

        let prompt = build_prompt(&m, None, En);
        assert!(prompt.contains("Primary emotion: pleasant"));
        assert!(prompt.contains("neutral 40%, pleasant 60%"));
    }

    #[test]
    fn test_transcript_truncated_by_chars() {
        let long = "가".repeat(600);
        let preview = transcript_preview(&long);
        assert_eq!(preview.chars().count(), TRANSCRIPT_PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));

        assert_eq!(transcript_preview("short answer"), "short answer");

        let prompt = build_prompt(&metrics(), Some(&long), En);
        assert!(prompt.contains("Answer content"));
    }

    #[test]
    fn test_korean_prompt() {
        assert_eq!(gaze_band(0.7, Ko), "우수");
        assert_eq!(smile_band(0.05, Ko), "개선 필요");
        assert_eq!(nod_band(0, Ko), "부족");
        assert_eq!(filler_band(7, Ko), "다소 많음");

        let prompt = build_prompt(&metrics(), Some("저는 백엔드 개발자로 일했습니다."), Ko);
        assert!(prompt.starts_with("당신은 면접 코칭 전문가입니다."));
        assert!(prompt.contains("카메라 응시 비율: 72.0%"));
        assert!(prompt.contains("고개 끄덕임 횟수: 4회"));
        assert!(prompt.contains("평가: 과다"));
        assert!(prompt.contains("5. 답변 내용 (참고용):"));
        assert!(!prompt.contains("Eye contact"));
        assert!(prompt.ends_with("피드백:"));
    }
}

//! Deterministic rule-based feedback
//!
//! Always produces six video-level items in a fixed order (eye contact, smile,
//! nodding, expression, pace, fillers), optionally followed by segment items
//! for sustained off-camera gaze. Text is rendered in the requested
//! [`FeedbackLanguage`]; bands and severities do not depend on it.

use crate::types::{Emotion, FeedbackItem, FeedbackLanguage, FrameSample, Gaze, MetricSet, Severity};
use FeedbackLanguage::{En, Ko};

pub const GAZE_GOOD: f64 = 0.8;
pub const GAZE_FAIR: f64 = 0.5;
pub const SMILE_GOOD: f64 = 0.3;
pub const SMILE_FAIR: f64 = 0.1;
pub const NODS_MAX_NATURAL: u32 = 2;
pub const WPM_FAST: f64 = 190.0;
pub const WPM_SLOW: f64 = 100.0;
pub const FILLERS_FREQUENT: u32 = 6;
pub const HAPPY_DOMINANT: f64 = 0.4;
pub const NEUTRAL_DOMINANT: f64 = 0.7;

/// Shortest off-camera stretch reported as a segment item (seconds)
pub const OFF_CAMERA_MIN_SEC: f64 = 3.0;

fn pct(ratio: f64) -> String {
    format!("{:.0}%", ratio * 100.0)
}

fn title(lang: FeedbackLanguage, en: &str, ko: &str) -> String {
    match lang {
        En => en.to_string(),
        Ko => ko.to_string(),
    }
}

pub fn gaze_item(ratio: f64, lang: FeedbackLanguage) -> FeedbackItem {
    let p = pct(ratio);
    let (message, severity) = if ratio >= GAZE_GOOD {
        (
            match lang {
                En => format!("You looked at the camera {p} of the time, which reads as steady and confident. Keep the same framing in future answers."),
                Ko => format!("카메라 응시 비율이 {p}로 매우 안정적이다. 정면 시선 유지가 잘 된다."),
            },
            Severity::Info,
        )
    } else if ratio >= GAZE_FAIR {
        (
            match lang {
                En => format!("You looked at the camera {p} of the time, which is mostly good. Hold eye contact through your key points and when you deliver the conclusion."),
                Ko => format!("카메라 응시 비율이 {p}로 대체로 양호하다. 핵심 답변 구간에서 조금 더 유지하면 좋다."),
            },
            Severity::Suggestion,
        )
    } else {
        (
            match lang {
                En => format!("You looked at the camera only {p} of the time. Place your notes next to the lens and practice returning your eyes to the camera at the start of each sentence."),
                Ko => format!("카메라 응시 비율이 {p}로 낮다. 정면 시선을 더 의식해보면 신뢰감이 올라간다."),
            },
            Severity::Warning,
        )
    };
    FeedbackItem::video(title(lang, "Eye contact", "시선 처리"), message, severity)
}

pub fn smile_item(ratio: f64, lang: FeedbackLanguage) -> FeedbackItem {
    let p = pct(ratio);
    let (message, severity) = if ratio >= SMILE_GOOD {
        (
            match lang {
                En => format!("You smiled naturally in {p} of the frames, which comes across as friendly and approachable."),
                Ko => format!("미소/긍정 표정 비율이 {p}로 자연스럽다. 친근한 인상을 준다."),
            },
            Severity::Info,
        )
    } else if ratio >= SMILE_FAIR {
        (
            match lang {
                En => format!("You smiled in {p} of the frames, which may be slightly low. Try a light smile when you open and when you wrap up your answer."),
                Ko => format!("미소 비율이 {p}로 약간 적을 수 있다. 시작/마무리에서 가볍게 웃어보면 좋다."),
            },
            Severity::Suggestion,
        )
    } else {
        (
            match lang {
                En => format!("You smiled in only {p} of the frames, so your expression may look stiff. Relax your jaw before answering and add a soft smile at the greeting and the closing line."),
                Ko => format!("미소 비율이 {p}로 낮다. 표정이 딱딱하게 보일 수 있어 의도적으로 부드러운 표정을 넣어보자."),
            },
            Severity::Warning,
        )
    };
    FeedbackItem::video(title(lang, "Smile", "미소"), message, severity)
}

pub fn nod_item(nod_count: u32, lang: FeedbackLanguage) -> FeedbackItem {
    let (message, severity) = if nod_count == 0 {
        (
            match lang {
                En => "Almost no nodding was detected, so your listening and agreement cues may look weak. A small nod when you acknowledge the question helps.".to_string(),
                Ko => "고개 끄덕임이 거의 감지되지 않는다. 공감/리스닝 제스처가 약해 보일 수 있다.".to_string(),
            },
            Severity::Suggestion,
        )
    } else if nod_count <= NODS_MAX_NATURAL {
        (
            match lang {
                En => format!("You nodded {nod_count} time(s), which is measured and gives the impression that you are engaged."),
                Ko => format!("끄덕임({nod_count}회)이 과하지 않고 적절하다. 경청하는 인상을 준다."),
            },
            Severity::Info,
        )
    } else {
        (
            match lang {
                En => format!("You nodded {nod_count} times, which is on the high side and can look nervous. Slow the motion down and keep your head still while making a point."),
                Ko => format!("끄덕임이 {nod_count}회로 많은 편이다. 과도하면 불안해 보일 수 있으니 속도를 조금 줄여도 좋다."),
            },
            Severity::Suggestion,
        )
    };
    FeedbackItem::video(title(lang, "Nodding", "고개 끄덕임"), message, severity)
}

/// Korean adjective phrase for an expression label
fn emotion_ko(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Happy => "밝고 긍정적",
        Emotion::Pleasant => "차분하고 호감가는",
        Emotion::Neutral => "중립적",
        Emotion::Focused => "집중하는",
        Emotion::Concerned => "걱정스러운",
        Emotion::Surprised => "놀람/집중",
    }
}

pub fn expression_item(metrics: &MetricSet, lang: FeedbackLanguage) -> FeedbackItem {
    let title = title(lang, "Overall expression", "전반적 표정");
    let Some(primary) = metrics.primary_emotion else {
        let message = match lang {
            En => "Not enough facial data was available to judge your overall expression. Check the lighting and keep your face centered in the frame.",
            Ko => "표정을 판단할 얼굴 데이터가 충분하지 않다. 조명을 확인하고 얼굴이 화면 중앙에 오도록 해보자.",
        };
        return FeedbackItem::video(title, message, Severity::Info);
    };
    let ratio = metrics
        .emotion_distribution
        .get(&primary)
        .copied()
        .unwrap_or(0.0);
    let p = pct(ratio);
    let name = emotion_ko(primary);

    let (message, severity) = match primary {
        Emotion::Happy if ratio > HAPPY_DOMINANT => (
            match lang {
                En => format!("A bright, positive expression dominated ({p}). That leaves a very favorable impression."),
                Ko => format!("전체적으로 {name} 표정({p})이 우세하다. 매우 긍정적인 인상을 준다."),
            },
            Severity::Info,
        ),
        Emotion::Pleasant => (
            match lang {
                En => format!("A calm, pleasant expression was most common ({p}). It reads as composed and trustworthy."),
                Ko => format!("{name} 표정({p})이 주를 이룬다. 안정적이고 신뢰감 있는 인상이다."),
            },
            Severity::Info,
        ),
        Emotion::Neutral if ratio > NEUTRAL_DOMINANT => (
            match lang {
                En => format!("Your expression stayed neutral most of the time ({p}). Add a smile when you reach your strongest points."),
                Ko => format!("중립적 표정({p})이 많다. 핵심 내용을 말할 때 미소를 더하면 좋다."),
            },
            Severity::Suggestion,
        ),
        Emotion::Concerned => (
            match lang {
                En => format!("Your expression looked somewhat tense ({p}). Take a slow breath and drop your shoulders before you start."),
                Ko => format!("다소 긴장된 표정({p})이 보인다. 심호흡하고 어깨를 내리면 좋다."),
            },
            Severity::Warning,
        ),
        other => (
            match lang {
                En => format!("Your most frequent expression was {other} ({p}). Your expression stayed consistent throughout the answer."),
                Ko => format!("가장 많이 나타난 표정은 {name} 표정({p})이다. 답변 내내 표정이 일관되었다."),
            },
            Severity::Info,
        ),
    };
    FeedbackItem::video(title, message, severity)
}

pub fn pace_item(wpm: f64, lang: FeedbackLanguage) -> FeedbackItem {
    let (message, severity) = if wpm > WPM_FAST {
        (
            match lang {
                En => format!("Your pace was {wpm:.0} WPM, which is fast. Insert a short pause between sentences so each point lands."),
                Ko => format!("말 속도가 WPM {wpm:.0}로 빠른 편이다. 문장 사이에 짧은 호흡을 넣어 전달력을 높여라."),
            },
            Severity::Warning,
        )
    } else if wpm < WPM_SLOW {
        (
            match lang {
                En => format!("Your pace was {wpm:.0} WPM, which is slow. Deliver your key sentences with a bit more momentum and confidence."),
                Ko => format!("말 속도가 WPM {wpm:.0}로 느린 편이다. 핵심 문장은 조금 더 자신 있게 속도를 줘도 좋다."),
            },
            Severity::Suggestion,
        )
    } else {
        (
            match lang {
                En => format!("Your pace of {wpm:.0} WPM was steady and easy to follow."),
                Ko => format!("말 속도(WPM {wpm:.0})가 안정적이다. 듣기 편한 템포다."),
            },
            Severity::Info,
        )
    };
    FeedbackItem::video(title(lang, "Speaking pace", "말 속도"), message, severity)
}

pub fn filler_item(filler_count: u32, lang: FeedbackLanguage) -> FeedbackItem {
    let (message, severity) = if filler_count > FILLERS_FREQUENT {
        (
            match lang {
                En => format!("Filler words (um, uh, 음, 어) came up {filler_count} times. Pause for a second to think before answering instead of filling the silence."),
                Ko => format!("필러(음/어/uh 등)가 {filler_count}회로 잦다. 답변 전 1초만 생각하고 말하면 훨씬 줄어든다."),
            },
            Severity::Warning,
        )
    } else {
        (
            match lang {
                En => format!("You used filler words {filler_count} time(s), which is not excessive. Your delivery sounded fluent overall."),
                Ko => format!("필러 사용({filler_count}회)이 과도하지 않다. 전반적으로 유창하다."),
            },
            Severity::Info,
        )
    };
    FeedbackItem::video(title(lang, "Filler words", "필러 사용"), message, severity)
}

/// The six video-level items, in fixed order
pub fn video_items(metrics: &MetricSet, lang: FeedbackLanguage) -> Vec<FeedbackItem> {
    vec![
        gaze_item(metrics.center_gaze_ratio, lang),
        smile_item(metrics.smile_ratio, lang),
        nod_item(metrics.nod_count, lang),
        expression_item(metrics, lang),
        pace_item(metrics.wpm, lang),
        filler_item(metrics.filler_count, lang),
    ]
}

/// A stretch of consecutive valid frames looking away from the camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffCameraSpan {
    pub start_sec: f64,
    pub end_sec: f64,
    /// Direction held in most of the span's frames
    pub direction: Gaze,
}

/// Find off-camera spans lasting at least `min_sec`. Invalid or CENTER frames
/// end a span.
pub fn off_camera_spans(timeline: &[FrameSample], min_sec: f64) -> Vec<OffCameraSpan> {
    let mut spans = Vec::new();
    // (start, end, left frames, right frames)
    let mut current: Option<(f64, f64, usize, usize)> = None;

    let close = |run: Option<(f64, f64, usize, usize)>, spans: &mut Vec<OffCameraSpan>| {
        if let Some((start, end, left, right)) = run {
            if end - start >= min_sec {
                spans.push(OffCameraSpan {
                    start_sec: start,
                    end_sec: end,
                    direction: if left >= right { Gaze::Left } else { Gaze::Right },
                });
            }
        }
    };

    for frame in timeline {
        let away = match (frame.valid, frame.gaze) {
            (true, Some(Gaze::Left)) => Some(Gaze::Left),
            (true, Some(Gaze::Right)) => Some(Gaze::Right),
            _ => None,
        };
        let Some(direction) = away else {
            close(current.take(), &mut spans);
            continue;
        };
        let left = usize::from(direction == Gaze::Left);
        if let Some(run) = current.as_mut() {
            run.1 = frame.timestamp;
            run.2 += left;
            run.3 += 1 - left;
        } else {
            current = Some((frame.timestamp, frame.timestamp, left, 1 - left));
        }
    }
    close(current.take(), &mut spans);
    spans
}

/// Segment items for sustained off-camera gaze
pub fn segment_items(timeline: &[FrameSample], lang: FeedbackLanguage) -> Vec<FeedbackItem> {
    off_camera_spans(timeline, OFF_CAMERA_MIN_SEC)
        .into_iter()
        .map(|span| {
            let (start, end) = (span.start_sec, span.end_sec);
            let side = match (lang, span.direction) {
                (En, Gaze::Right) => "right",
                (En, _) => "left",
                (Ko, Gaze::Right) => "오른쪽",
                (Ko, _) => "왼쪽",
            };
            let message = match lang {
                En => format!(
                    "From {start:.1}s to {end:.1}s your gaze stayed off camera, mostly to the {side}. Bring your eyes back to the lens while you gather your thoughts."
                ),
                Ko => format!(
                    "{start:.1}초부터 {end:.1}초까지 시선이 주로 {side}으로 카메라를 벗어났다. 생각을 정리할 때도 렌즈를 바라보도록 연습해보자."
                ),
            };
            FeedbackItem::segment(
                title(lang, "Looking away", "시선 이탈"),
                message,
                Severity::Suggestion,
                start,
                end,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeedbackLevel;
    use FeedbackLanguage::{En, Ko};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn metrics() -> MetricSet {
        MetricSet {
            center_gaze_ratio: 0.85,
            smile_ratio: 0.2,
            smile_threshold_used: Some(0.55),
            nod_count: 1,
            emotion_distribution: BTreeMap::new(),
            primary_emotion: None,
            wpm: 150.0,
            filler_count: 3,
            metadata: None,
        }
    }

    fn look(t: f64, gaze: Gaze) -> FrameSample {
        FrameSample {
            timestamp: t,
            valid: true,
            gaze: Some(gaze),
            smile_score: Some(0.5),
            yaw: Some(0.0),
            pitch: Some(0.0),
            roll: Some(0.0),
            emotion: None,
            blendshapes: None,
        }
    }

    #[test]
    fn test_six_items_in_order() {
        let items = video_items(&metrics(), En);
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Eye contact",
                "Smile",
                "Nodding",
                "Overall expression",
                "Speaking pace",
                "Filler words"
            ]
        );
        assert!(items.iter().all(|i| i.level == FeedbackLevel::Video));
    }

    #[test]
    fn test_gaze_bands() {
        assert_eq!(gaze_item(0.8, En).severity, Severity::Info);
        assert_eq!(gaze_item(0.79, En).severity, Severity::Suggestion);
        assert_eq!(gaze_item(0.5, En).severity, Severity::Suggestion);
        assert_eq!(gaze_item(0.49, En).severity, Severity::Warning);
        assert!(gaze_item(0.85, En).message.contains("85%"));
    }

    #[test]
    fn test_smile_and_nod_bands() {
        assert_eq!(smile_item(0.3, En).severity, Severity::Info);
        assert_eq!(smile_item(0.1, En).severity, Severity::Suggestion);
        assert_eq!(smile_item(0.05, En).severity, Severity::Warning);

        assert_eq!(nod_item(0, En).severity, Severity::Suggestion);
        assert_eq!(nod_item(2, En).severity, Severity::Info);
        assert_eq!(nod_item(3, En).severity, Severity::Suggestion);
    }

    #[test]
    fn test_pace_and_filler_bands() {
        assert_eq!(pace_item(191.0, En).severity, Severity::Warning);
        assert_eq!(pace_item(190.0, En).severity, Severity::Info);
        assert_eq!(pace_item(99.0, En).severity, Severity::Suggestion);
        assert!(pace_item(150.4, En).message.contains("150 WPM"));

        assert_eq!(filler_item(7, En).severity, Severity::Warning);
        assert_eq!(filler_item(6, En).severity, Severity::Info);
    }

    #[test]
    fn test_expression_variants() {
        let mut m = metrics();
        assert!(expression_item(&m, En).message.contains("Not enough facial data"));

        m.primary_emotion = Some(Emotion::Concerned);
        m.emotion_distribution.insert(Emotion::Concerned, 0.5);
        assert_eq!(expression_item(&m, En).severity, Severity::Warning);

        m.primary_emotion = Some(Emotion::Happy);
        m.emotion_distribution.insert(Emotion::Happy, 0.3);
        let item = expression_item(&m, En);
        assert_eq!(item.severity, Severity::Info);
        assert!(item.message.contains("happy"));
    }

    #[test]
    fn test_off_camera_spans() {
        let mut timeline: Vec<FrameSample> = (0..5).map(|i| look(i as f64 * 0.2, Gaze::Center)).collect();
        // 1.0s .. 4.2s looking left (17 frames)
        for i in 5..22 {
            timeline.push(look(i as f64 * 0.2, Gaze::Left));
        }
        timeline.push(look(4.4, Gaze::Center));
        // Short glance right: 0.4s
        timeline.push(look(4.6, Gaze::Right));
        timeline.push(look(4.8, Gaze::Right));
        timeline.push(look(5.0, Gaze::Right));

        let spans = off_camera_spans(&timeline, OFF_CAMERA_MIN_SEC);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].direction, Gaze::Left);
        assert!((spans[0].start_sec - 1.0).abs() < 1e-9);
        assert!((spans[0].end_sec - 4.2).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_frame_breaks_span() {
        let mut timeline: Vec<FrameSample> = (0..10).map(|i| look(i as f64 * 0.2, Gaze::Right)).collect();
        timeline.push(FrameSample::invalid(2.0));
        timeline.extend((11..20).map(|i| look(i as f64 * 0.2, Gaze::Right)));

        assert!(off_camera_spans(&timeline, OFF_CAMERA_MIN_SEC).is_empty());
    }

    #[test]
    fn test_segment_items() {
        let timeline: Vec<FrameSample> = (0..20).map(|i| look(i as f64 * 0.2, Gaze::Right)).collect();
        let items = segment_items(&timeline, En);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].level, FeedbackLevel::Segment);
        assert_eq!(items[0].start_sec, Some(0.0));
        assert!(items[0].message.contains("right"));
    }

    #[test]
    fn test_korean_items_keep_bands() {
        let items = video_items(&metrics(), Ko);
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["시선 처리", "미소", "고개 끄덕임", "전반적 표정", "말 속도", "필러 사용"]
        );
        assert_eq!(items[0].message, "카메라 응시 비율이 85%로 매우 안정적이다. 정면 시선 유지가 잘 된다.");
        assert_eq!(
            items.iter().map(|i| i.severity).collect::<Vec<_>>(),
            video_items(&metrics(), En).iter().map(|i| i.severity).collect::<Vec<_>>()
        );
        assert!(pace_item(200.0, Ko).message.contains("WPM 200"));
        assert!(filler_item(9, Ko).message.contains("9회"));

        let timeline: Vec<FrameSample> = (0..20).map(|i| look(i as f64 * 0.2, Gaze::Left)).collect();
        let segments = segment_items(&timeline, Ko);
        assert_eq!(segments[0].title, "시선 이탈");
        assert!(segments[0].message.contains("왼쪽"));
    }
}

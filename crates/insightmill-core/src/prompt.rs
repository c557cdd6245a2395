//! Prompt templates for the two transform kinds.

/// Transcripts longer than this are truncated before extraction; the model
/// context cannot hold more anyway.
pub const EXTRACTION_TRANSCRIPT_CAP: usize = 80_000;

/// EN -> ZH translation of one transcript chunk.
pub fn translation_prompt(chunk: &str) -> String {
    format!(
        r#"你是一名专业的中英文翻译专家，专门翻译播客对话内容。请将以下英文播客转录完整翻译成中文。

翻译要求：
1. 保留说话人标记 (如 "Lenny (00:01:23):")
2. 保持对话的自然流畅性
3. 专业术语保留英文并附中文解释
4. 完整翻译，不要省略任何内容
5. 保持时间戳格式不变

英文转录内容：
{chunk}

请直接输出中文翻译："#
    )
}

/// Structured methodology extraction from a full transcript.
pub fn extraction_prompt(transcript: &str) -> String {
    let transcript = truncate_chars(transcript, EXTRACTION_TRANSCRIPT_CAP);
    format!(
        r#"You are an expert product management analyst. Analyze this podcast transcript and extract structured data.

TRANSCRIPT:
{transcript}

---

Please extract and return a JSON object with the following structure:
{{
  "guest": {{
    "name": "Guest full name",
    "title": "Current/Former title and company",
    "company": "Primary company"
  }},
  "keyTakeaways": ["5-8 key insights from this episode"],
  "methodologies": [
    {{
      "name": "Framework/Methodology name",
      "category": "one of: product-strategy, growth-metrics, team-culture, user-research, execution, career-leadership",
      "summary": "2-3 sentence description",
      "principles": ["3-5 core principles"],
      "quote": "One powerful quote from the guest"
    }}
  ]
}}

Return ONLY valid JSON. Extract 1-3 methodologies per episode.
"#
    )
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_prompt_embeds_the_chunk() {
        let prompt = translation_prompt("Lenny (00:01:23): Welcome back.");
        assert!(prompt.contains("Lenny (00:01:23): Welcome back."));
        assert!(prompt.contains("翻译要求"));
    }

    #[test]
    fn extraction_prompt_truncates_long_transcripts() {
        let transcript = "word ".repeat(30_000);
        let prompt = extraction_prompt(&transcript);
        assert!(prompt.len() < transcript.len());
        assert!(prompt.contains("Return ONLY valid JSON"));
    }

    #[test]
    fn truncate_is_char_boundary_safe() {
        let text = "中文字符".repeat(10);
        assert_eq!(truncate_chars(&text, 3), "中文字");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}

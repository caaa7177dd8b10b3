//! Prompt assembly.
//!
//! Pure functions, no I/O: the same (context, history, query) inputs always
//! produce byte-identical prompt text. The template order is fixed —
//! instruction preamble, document context block, chat history block,
//! current query. Empty context or history render as empty strings, not
//! placeholder text.

use crate::models::ChatTurn;

/// Render turns oldest-first as `User:` / `Assistant:` lines, one per turn,
/// each newline-terminated.
pub fn render_history(turns: &[ChatTurn]) -> String {
    let mut out = String::new();
    for turn in turns {
        out.push_str(turn.role.label());
        out.push_str(": ");
        out.push_str(&turn.content);
        out.push('\n');
    }
    out
}

/// Combine retrieved context, trailing history, and the current query into
/// a single model input.
pub fn build_prompt(context: &str, history: &[ChatTurn], query: &str) -> String {
    format!(
        "System: You are an expert document extraction AI. Answer the user's prompt directly \
         using ONLY the provided Document Context. Do not use conversational filler. If the \
         user refers to previous questions, use the Chat History.\n\
         \n\
         Document Context:\n\
         {context}\n\
         \n\
         Chat History:\n\
         {history}\n\
         \n\
         User: {query}\n\
         Answer:",
        context = context,
        history = render_history(history),
        query = query
    )
}

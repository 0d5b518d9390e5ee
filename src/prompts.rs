//! Instruction prompt sent ahead of the invoice pages.
//!
//! Callers can override it via [`crate::config::ExtractionConfig::system_prompt`];
//! the constant here is used only when no override is provided.

/// Default instruction for invoice question answering.
pub const INVOICE_INSTRUCTION_PROMPT: &str = "You are an expert in understanding invoices.
You will receive input images as invoices &
you will have to answer questions based on the input images";

/// Pick the override when it has content, otherwise the built-in prompt.
pub fn instruction_prompt(custom: Option<&str>) -> &str {
    match custom {
        Some(p) if !p.trim().is_empty() => p,
        _ => INVOICE_INSTRUCTION_PROMPT,
    }
}

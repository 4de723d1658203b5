/// Scores below this get healthier alternatives suggested.
pub const ALTERNATIVES_THRESHOLD: u8 = 60;

pub fn build_instruction(language: &str) -> String {
    format!(
        "Analyze this image for food health purposes. The image may show a nutrition label, an ingredients list, \
        the front of the packaging, or a QR code / barcode.\n\
        \n\
        1. Identify the product:\n\
        - Read the visible brand and product name.\n\
        - If only a QR code or barcode is visible, use its digits or pattern to infer the specific product.\n\
        - If no text is visible, identify the product from its appearance.\n\
        \n\
        2. Analyze health:\n\
        - Extract ingredients and nutrition values where visible and list notable additives (E-numbers).\n\
        - Base the health score (0-100) on the observed ingredients, nutrients and additives, not on brand reputation.\n\
        - If the text is blurry or missing but the product is identified, estimate from typical values for that product type.\n\
        \n\
        3. Suggest alternatives:\n\
        - Only if the health score is below {threshold}, suggest 2-3 healthier generic product types \
        (e.g. sugary soda -> sparkling water with fruit). Never output brand URLs.\n\
        - If the score is {threshold} or higher, leave alternatives empty.\n\
        \n\
        4. Output:\n\
        - Respond ONLY with JSON matching the provided schema.\n\
        - Every free-text field (productName, summary, pros, cons, additive descriptions, alternatives, highlights) \
        MUST be written in {language}.",
        threshold = ALTERNATIVES_THRESHOLD,
        language = language,
    )
}

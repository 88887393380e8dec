use std::fmt;

use crate::error::ServiceError;

/// Instruction sent with every meal analysis request.
pub const MEAL_PROMPT: &str = "You are a nutrition assistant. Estimate the nutritional content \
of the meal described or pictured below. Give a short, descriptive name for the meal and \
estimate total calories (kcal) and grams of protein, carbohydrates and fat for the whole \
portion. If the portion size is unclear, assume a typical single serving.";

/// Shape the reply must take.
pub const JSON_SHAPE_HINT: &str = "Respond with only a JSON object, no extra text, exactly \
in this shape: {\"name\": string, \"calories\": number, \"protein\": number, \
\"carbs\": number, \"fat\": number}";

/// Raw image bytes with their MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    /// Guess the MIME type from a file extension. Unknown extensions fall back to JPEG.
    #[must_use]
    pub fn from_extension(ext: &str, bytes: Vec<u8>) -> Self {
        let mime_type = match ext.to_ascii_lowercase().as_str() {
            "png" => "image/png",
            "webp" => "image/webp",
            "heic" => "image/heic",
            "heif" => "image/heif",
            "gif" => "image/gif",
            _ => "image/jpeg",
        };
        Self {
            mime_type: mime_type.to_string(),
            bytes,
        }
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("bytes", &format_args!("[{} bytes]", self.bytes.len()))
            .finish()
    }
}

/// What the user gave us to describe a meal: text, a photo, or both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MealInput {
    Text(String),
    Image(ImagePayload),
    TextAndImage(String, ImagePayload),
}

impl MealInput {
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::TextAndImage(text, _) => Some(text),
            Self::Image(_) => None,
        }
    }

    #[must_use]
    pub fn image(&self) -> Option<&ImagePayload> {
        match self {
            Self::Image(image) | Self::TextAndImage(_, image) => Some(image),
            Self::Text(_) => None,
        }
    }
}

/// Fully assembled outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MealRequest {
    pub prompt: String,
    pub description: Option<String>,
    pub image: Option<ImagePayload>,
}

impl MealRequest {
    /// Combine the fixed instructions, the JSON shape hint and the user's input.
    #[must_use]
    pub fn build(input: &MealInput) -> Self {
        Self {
            prompt: format!("{MEAL_PROMPT}\n\n{JSON_SHAPE_HINT}"),
            description: input
                .description()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            image: input.image().cloned(),
        }
    }
}

/// An opaque text-completion service that describes meals.
///
/// Implementations block until the reply arrives or their own deadline passes, and report
/// a deadline as [`ServiceError::Timeout`].
pub trait MealAnalyzer: Send + Sync {
    fn analyze(&self, request: &MealRequest) -> Result<String, ServiceError>;
}

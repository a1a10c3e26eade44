//! Extraction fields: which worksheet text a run converges

use serde::{Deserialize, Serialize};

/// The two short text fields extracted from each worksheet photo
///
/// Each field carries its own prompt, checkpoint file and label prefixes;
/// the trailing-clause contamination patterns live with the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionField {
    /// 题目说明: how the exercise is to be worked
    Description,
    /// 过关要求: the score/time needed to pass the exercise
    Requirement,
}

impl ExtractionField {
    /// Extraction prompt sent with the worksheet photo
    pub fn prompt(&self) -> &'static str {
        match self {
            ExtractionField::Description => {
                "这是一张练习题的照片。请找出图片中的题目说明文字，\
                 只输出题目说明的原文，不要输出题号、过关要求或任何解释。"
            }
            ExtractionField::Requirement => {
                "这是一张练习题的照片。请找出图片中的过关要求文字，\
                 只输出过关要求的原文，不要输出题号、题目说明或任何解释。"
            }
        }
    }

    /// Checkpoint file name under the root folder
    pub fn store_file(&self) -> &'static str {
        match self {
            ExtractionField::Description => "descriptions.json",
            ExtractionField::Requirement => "requirements.json",
        }
    }

    /// Label prefixes the extractor tends to echo back in front of the value
    pub fn label_prefixes(&self) -> &'static [&'static str] {
        match self {
            ExtractionField::Description => {
                &["题目说明：", "题目说明:", "说明：", "说明:"]
            }
            ExtractionField::Requirement => {
                &["过关要求：", "过关要求:", "要求：", "要求:"]
            }
        }
    }
}

impl std::fmt::Display for ExtractionField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionField::Description => write!(f, "description"),
            ExtractionField::Requirement => write!(f, "requirement"),
        }
    }
}

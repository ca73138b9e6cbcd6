//! # Yomidic
//!
//! Yomidicは、かな漢字変換エンジン向けのオフラインシステム辞書ビルダーです。
//!
//! ## 概要
//!
//! このライブラリは、語彙トークン（読み・表層形・品詞ID・コストの組）の
//! 集合から、コンパクトで自己記述的なバイナリ辞書イメージを構築します。
//! イメージは2つのLOUDS符号化トライと、ビットベクトルでパックされた
//! トークン配列、高頻度品詞テーブルから成り、変換エンジンが後から
//! メモリマップして接頭辞検索するための互換性契約です。
//!
//! ## 主な機能
//!
//! - **多段パスのビルドパイプライン**: 読みによる畳み込み、高頻度品詞の
//!   選定、トライ構築、トークン分類、逆引き順の配列構築
//! - **LOUDSトライイメージ**: 符号化バイト列の辞書式順序で密なIDを割り当て
//! - **トークンの可変長符号化**: 品詞・値・コストの冗長性をフラグで圧縮
//! - **TSVテキスト辞書の読み込み**
//!
//! ## 使用例
//!
//! ```
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use yomidic::dictionary::{BuilderConfig, SystemDictionaryBuilder};
//! use yomidic::loader::TextDictionaryLoader;
//!
//! let lexicon_tsv = "きょう\t10\t20\t3000\t今日\n\
//!                    きょう\t10\t20\t4000\t京\n\
//!                    きょう\t10\t20\t5000\tキョウ\n";
//! let tokens = TextDictionaryLoader::from_reader(lexicon_tsv.as_bytes())?;
//!
//! let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
//! builder.build_from_tokens(&tokens)?;
//!
//! let mut image = vec![];
//! builder.write_to_stream(None, &mut image)?;
//! assert_eq!(&image[..4], b"YDIC");
//! # Ok(())
//! # }
//! ```

/// 辞書データ構造とビルダー
pub mod dictionary;

/// エラー型の定義
pub mod errors;

/// テキスト辞書の読み込み
pub mod loader;

/// 簡潔データ構造のイメージビルダー
pub mod storage;

/// トークン型の定義
pub mod token;

/// 内部ユーティリティ関数
pub mod utils;

// Re-exports
pub use dictionary::{BuilderConfig, SystemDictionaryBuilder};
pub use token::{Token, TokenAttributes};

/// このライブラリのバージョン番号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

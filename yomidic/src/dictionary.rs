//! システム辞書のデータ構造とビルダー
//!
//! このモジュールは、語彙トークンの集合からシステム辞書のバイナリイメージを
//! 構築するためのビルダーと、その協力者（コーデック、ファイルコーデック、
//! ビルダー注釈）を提供します。

pub mod builder;
pub mod codec;
pub mod file;
pub mod words_info;

pub use builder::{BuilderConfig, SystemDictionaryBuilder};
pub use codec::{SystemCodec, SystemDictionaryCodec};
pub use file::{DefaultDictionaryFileCodec, DictionaryFileCodec, DictionaryFileSection};

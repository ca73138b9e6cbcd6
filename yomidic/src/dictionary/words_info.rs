//! ビルダーが付与するトークン注釈
//!
//! このモジュールは、辞書ビルダーの各パスが読み書きする中間注釈
//! （[`TokenInfo`]と[`KeyInfo`]）を定義します。

use crate::token::Token;

/// コスト符号化の種別
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum CostType {
    /// 通常の2バイト符号化
    #[default]
    Default,

    /// 1バイトの小型符号化を使用できる
    ///
    /// 同一キー内に同品詞の同音語がなく、かつキーが十分長い場合のみ
    /// 設定されます。
    CanUseSmallEncoding,
}

/// 品詞符号化の種別
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum PosType {
    /// 左右IDをそのまま格納する
    #[default]
    Default,

    /// 高頻度品詞テーブルの密なIDで格納する
    FrequentPos,

    /// 直前のトークンと同じ品詞（格納を省略する）
    ///
    /// `FrequentPos`より優先されます。
    SameAsPrevPos,
}

/// 表層形符号化の種別
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum ValueType {
    /// 値トライのIDで格納する
    #[default]
    DefaultValue,

    /// 値がキーと同一（読み時にキーから復元する）
    AsIsHiragana,

    /// 値がキーのカタカナ形と同一（読み時にキーから復元する）
    AsIsKatakana,

    /// 直前のトークンと同じ値（格納を省略する）
    SameAsPrevValue,
}

/// 1トークン分のビルダー注釈
///
/// 入力トークンへの参照と、分類パスが書き込むフラグ群を保持します。
/// トークンの所有権は持ちません。
#[derive(Debug, Clone)]
pub struct TokenInfo<'a> {
    /// 入力トークンへの参照
    pub token: &'a Token,

    /// 値トライビルダーが割り当てたID
    ///
    /// 符号化した表層形が値トライに存在しない場合は`None`です。
    pub id_in_value_trie: Option<u32>,

    /// コスト符号化の種別
    pub cost_type: CostType,

    /// 品詞符号化の種別
    pub pos_type: PosType,

    /// 高頻度品詞テーブル内の密なID
    ///
    /// 結合品詞がテーブルに含まれる場合のみ設定されます。
    pub id_in_frequent_pos_map: Option<u8>,

    /// 表層形符号化の種別
    pub value_type: ValueType,
}

impl<'a> TokenInfo<'a> {
    /// トークンを参照する注釈を既定値で作成します。
    pub fn new(token: &'a Token) -> Self {
        Self {
            token,
            id_in_value_trie: None,
            cost_type: CostType::default(),
            pos_type: PosType::default(),
            id_in_frequent_pos_map: None,
            value_type: ValueType::default(),
        }
    }
}

/// 1つの読みを共有するトークンの集合
#[derive(Debug, Clone)]
pub struct KeyInfo<'a> {
    /// 共有される読み
    pub key: &'a str,

    /// キートライビルダーが割り当てたID
    pub id_in_key_trie: Option<u32>,

    /// この読みに属するトークン注釈の列（非空）
    pub tokens: Vec<TokenInfo<'a>>,
}

impl<'a> KeyInfo<'a> {
    /// 空のKeyInfoを作成します。
    pub fn new(key: &'a str) -> Self {
        Self {
            key,
            id_in_key_trie: None,
            tokens: vec![],
        }
    }
}

/// ビルダーが処理するKeyInfoの列
pub type KeyInfoList<'a> = Vec<KeyInfo<'a>>;

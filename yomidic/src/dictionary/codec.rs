//! システム辞書のコーデック
//!
//! このモジュールは、読み・表層形・トークン列をコンパクトなバイト列へ
//! 変換するコーデックを提供します。符号化は決定的で、バイトレイアウトは
//! 辞書イメージの互換性契約の一部です。
//!
//! 文字の符号化（キーと値で共通）:
//!
//! ```text
//! U+3041..=U+309F (ひらがな)   → 1バイト: cp - 0x3040          (0x01..=0x5F)
//! U+30A1..=U+30FF (カタカナ)   → 1バイト: cp - 0x30A1 + 0x60   (0x60..=0xBE)
//! U+4E00..=U+9FFF (CJK統合漢字) → 0xBF + (cp - 0x4E00) u16 LE
//! その他                       → 0x00 + コードポイント 3バイト LE
//! ```
//!
//! トークンの符号化（1トークンにつきフラグ1バイト + フィールド列）:
//!
//! ```text
//! bit 0-1: 品詞形式   0=lid u16 LE + rid u16 LE / 1=高頻度ID 1バイト / 2=直前と同じ
//! bit 2-3: 値形式     0=値トライID 3バイト LE / 1=ひらがなそのまま /
//!                     2=カタカナそのまま / 3=直前と同じ
//! bit 4:   小型コスト 1=コスト1バイト / 0=コスト i16 LE
//! bit 5:   属性バイトが続く
//! bit 6:   このキーの最終トークン
//! bit 7:   常に0（0xFFはトークン列終端フラグとして予約）
//! ```

use crate::dictionary::words_info::{CostType, PosType, TokenInfo, ValueType};
use crate::errors::{Result, YomidicError};
use crate::token::TokenAttributes;

/// 品詞形式のビットマスク
const FLAG_POS_MASK: u8 = 0b0000_0011;
/// 品詞を左右IDで格納することを示すフラグ値
const FLAG_POS_DEFAULT: u8 = 0;
/// 品詞を高頻度IDで格納することを示すフラグ値
const FLAG_POS_FREQUENT: u8 = 1;
/// 品詞が直前のトークンと同じであることを示すフラグ値
const FLAG_POS_SAME_AS_PREV: u8 = 2;

/// 値形式のビットマスク
const FLAG_VALUE_MASK: u8 = 0b0000_1100;
/// 値を値トライIDで格納することを示すフラグ値
const FLAG_VALUE_DEFAULT: u8 = 0;
/// 値がキーと同一であることを示すフラグ値
const FLAG_VALUE_AS_IS_HIRAGANA: u8 = 1 << 2;
/// 値がキーのカタカナ形と同一であることを示すフラグ値
const FLAG_VALUE_AS_IS_KATAKANA: u8 = 2 << 2;
/// 値が直前のトークンと同じであることを示すフラグ値
const FLAG_VALUE_SAME_AS_PREV: u8 = 3 << 2;

/// コストを1バイトで格納することを示すフラグ
const FLAG_SMALL_COST: u8 = 0b0001_0000;
/// 属性バイトが続くことを示すフラグ
const FLAG_HAS_ATTRIBUTES: u8 = 0b0010_0000;
/// キーの最終トークンであることを示すフラグ
const FLAG_LAST_TOKEN: u8 = 0b0100_0000;

/// トークン配列の終端を示すフラグバイト
///
/// bit 7が立っているため、通常のフラグバイトと衝突しません。
const TOKENS_TERMINATION_FLAG: u8 = 0xFF;

/// 値トライIDの上限（3バイト符号化のため24ビット）
const MAX_VALUE_TRIE_ID: u32 = (1 << 24) - 1;

/// システム辞書のコーデックインターフェース
///
/// ビルダーはこのトレイトを介して読み・表層形・トークン列を符号化します。
/// 実装は純粋（状態を持たない）かつ決定的でなければなりません。
pub trait SystemDictionaryCodec {
    /// 読みをバイト列に符号化します。
    fn encode_key(&self, key: &str) -> Vec<u8>;

    /// 符号化された読みを復元します。
    ///
    /// # エラー
    ///
    /// バイト列が符号化の出力として不正な場合にエラーを返します。
    fn decode_key(&self, bytes: &[u8]) -> Result<String>;

    /// 表層形をバイト列に符号化します。
    fn encode_value(&self, value: &str) -> Vec<u8>;

    /// 符号化された表層形を復元します。
    ///
    /// # エラー
    ///
    /// バイト列が符号化の出力として不正な場合にエラーを返します。
    fn decode_value(&self, bytes: &[u8]) -> Result<String>;

    /// 1つの読みに属するトークン注釈の列を符号化します。
    ///
    /// # エラー
    ///
    /// 注釈とフラグが矛盾している場合（高頻度品詞IDの欠落、値トライIDの
    /// 欠落・桁あふれなど）にエラーを返します。
    fn encode_tokens(&self, tokens: &[TokenInfo]) -> Result<Vec<u8>>;

    /// 符号化されたトークン列を構造的に復元します。
    ///
    /// 品詞・値の参照は符号化時の形式のまま返します。解決には高頻度品詞
    /// テーブルと値トライが必要です。
    ///
    /// # エラー
    ///
    /// バイト列が途中で切れている場合や終端フラグが現れた場合に
    /// エラーを返します。
    fn decode_tokens(&self, bytes: &[u8]) -> Result<Vec<DecodedToken>>;

    /// トークン配列の終端を示すフラグバイトを取得します。
    fn tokens_termination_flag(&self) -> u8;

    /// 値トライセクションの論理名を取得します。
    fn section_name_for_value(&self) -> &'static str;

    /// キートライセクションの論理名を取得します。
    fn section_name_for_key(&self) -> &'static str;

    /// トークン配列セクションの論理名を取得します。
    fn section_name_for_tokens(&self) -> &'static str;

    /// 高頻度品詞テーブルセクションの論理名を取得します。
    fn section_name_for_pos(&self) -> &'static str;
}

/// 復元されたトークンの品詞表現
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DecodedPos {
    /// 左右IDがそのまま格納されていた
    Explicit {
        /// 左品詞ID
        lid: u16,
        /// 右品詞ID
        rid: u16,
    },

    /// 高頻度品詞テーブルの密なIDで格納されていた
    FrequentPos(u8),

    /// 直前のトークンと同じ
    SameAsPrev,
}

/// 復元されたトークンの値表現
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DecodedValue {
    /// 値トライのID
    TrieId(u32),

    /// キーと同一（キーから復元する）
    AsIsHiragana,

    /// キーのカタカナ形と同一（キーから復元する）
    AsIsKatakana,

    /// 直前のトークンと同じ
    SameAsPrev,
}

/// 構造的に復元された1トークン
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DecodedToken {
    /// 品詞表現
    pub pos: DecodedPos,

    /// 単語コスト
    pub cost: i16,

    /// 値表現
    pub value: DecodedValue,

    /// 属性集合
    pub attributes: TokenAttributes,
}

/// 既定のシステム辞書コーデック
///
/// モジュールドキュメントに記載されたバイトレイアウトを実装します。
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCodec;

impl SystemCodec {
    /// 新しいコーデックを作成します。
    pub const fn new() -> Self {
        Self
    }
}

/// 1文字を符号化して`out`に追記する
fn encode_char(c: char, out: &mut Vec<u8>) {
    let cp = u32::from(c);
    match cp {
        0x3041..=0x309F => out.push((cp - 0x3040) as u8),
        0x30A1..=0x30FF => out.push((cp - 0x30A1 + 0x60) as u8),
        0x4E00..=0x9FFF => {
            out.push(0xBF);
            out.extend(((cp - 0x4E00) as u16).to_le_bytes());
        }
        _ => {
            out.push(0x00);
            out.extend(&cp.to_le_bytes()[..3]);
        }
    }
}

/// 文字列全体を符号化する
fn encode_string(src: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    for c in src.chars() {
        encode_char(c, &mut out);
    }
    out
}

/// 符号化されたバイト列から文字列を復元する
fn decode_string(bytes: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut rest = bytes;
    while let Some((&lead, tail)) = rest.split_first() {
        let (cp, tail) = match lead {
            0x00 => {
                let (raw, tail) = split_bytes::<3>(tail)?;
                (u32::from_le_bytes([raw[0], raw[1], raw[2], 0]), tail)
            }
            0x01..=0x5F => (0x3040 + u32::from(lead), tail),
            0x60..=0xBE => (0x30A1 + u32::from(lead - 0x60), tail),
            0xBF => {
                let (raw, tail) = split_bytes::<2>(tail)?;
                (0x4E00 + u32::from(u16::from_le_bytes(raw)), tail)
            }
            _ => {
                return Err(YomidicError::invalid_format(
                    "encoded string",
                    format!("unexpected lead byte {lead:#04x}"),
                ));
            }
        };
        let c = char::from_u32(cp).ok_or_else(|| {
            YomidicError::invalid_format(
                "encoded string",
                format!("invalid codepoint {cp:#x}"),
            )
        })?;
        out.push(c);
        rest = tail;
    }
    Ok(out)
}

/// 先頭からNバイトを取り出す
fn split_bytes<const N: usize>(bytes: &[u8]) -> Result<([u8; N], &[u8])> {
    if bytes.len() < N {
        return Err(YomidicError::invalid_format(
            "encoded bytes",
            "truncated input",
        ));
    }
    let mut raw = [0; N];
    raw.copy_from_slice(&bytes[..N]);
    Ok((raw, &bytes[N..]))
}

impl SystemDictionaryCodec for SystemCodec {
    fn encode_key(&self, key: &str) -> Vec<u8> {
        encode_string(key)
    }

    fn decode_key(&self, bytes: &[u8]) -> Result<String> {
        decode_string(bytes)
    }

    fn encode_value(&self, value: &str) -> Vec<u8> {
        encode_string(value)
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<String> {
        decode_string(bytes)
    }

    fn encode_tokens(&self, tokens: &[TokenInfo]) -> Result<Vec<u8>> {
        if tokens.is_empty() {
            return Err(YomidicError::invalid_argument(
                "tokens",
                "token list of a key must not be empty",
            ));
        }
        let mut out = vec![];
        for (i, info) in tokens.iter().enumerate() {
            let mut flags = 0;
            let mut fields = vec![];

            match info.pos_type {
                PosType::Default => {
                    flags |= FLAG_POS_DEFAULT;
                    fields.extend(info.token.lid.to_le_bytes());
                    fields.extend(info.token.rid.to_le_bytes());
                }
                PosType::FrequentPos => {
                    flags |= FLAG_POS_FREQUENT;
                    let id = info.id_in_frequent_pos_map.ok_or_else(|| {
                        YomidicError::invalid_state(
                            "encode_tokens",
                            "FrequentPos token without a dense pos id",
                        )
                    })?;
                    fields.push(id);
                }
                PosType::SameAsPrevPos => flags |= FLAG_POS_SAME_AS_PREV,
            }

            // The small form is a permission, not an obligation: fall back to
            // the two-byte form whenever the cost does not fit in one byte.
            let cost = info.token.cost;
            if info.cost_type == CostType::CanUseSmallEncoding && (0..=0xFF).contains(&cost) {
                flags |= FLAG_SMALL_COST;
                fields.push(cost as u8);
            } else {
                fields.extend(cost.to_le_bytes());
            }

            match info.value_type {
                ValueType::DefaultValue => {
                    flags |= FLAG_VALUE_DEFAULT;
                    let id = info.id_in_value_trie.ok_or_else(|| {
                        YomidicError::invalid_state(
                            "encode_tokens",
                            "DefaultValue token without a value trie id",
                        )
                    })?;
                    if id > MAX_VALUE_TRIE_ID {
                        return Err(YomidicError::invalid_state(
                            "encode_tokens",
                            format!("value trie id {id} does not fit in 24 bits"),
                        ));
                    }
                    fields.extend(&id.to_le_bytes()[..3]);
                }
                ValueType::AsIsHiragana => flags |= FLAG_VALUE_AS_IS_HIRAGANA,
                ValueType::AsIsKatakana => flags |= FLAG_VALUE_AS_IS_KATAKANA,
                ValueType::SameAsPrevValue => flags |= FLAG_VALUE_SAME_AS_PREV,
            }

            if !info.token.attributes.is_empty() {
                flags |= FLAG_HAS_ATTRIBUTES;
                fields.push(info.token.attributes.bits());
            }
            if i + 1 == tokens.len() {
                flags |= FLAG_LAST_TOKEN;
            }

            debug_assert_eq!(flags & 0x80, 0);
            out.push(flags);
            out.extend(fields);
        }
        Ok(out)
    }

    fn decode_tokens(&self, bytes: &[u8]) -> Result<Vec<DecodedToken>> {
        let mut out = vec![];
        let mut rest = bytes;
        loop {
            let Some((&flags, tail)) = rest.split_first() else {
                return Err(YomidicError::invalid_format(
                    "tokens",
                    "token list ended without a last-token flag",
                ));
            };
            if flags & 0x80 != 0 {
                return Err(YomidicError::invalid_format(
                    "tokens",
                    format!("unexpected flag byte {flags:#04x} inside a token list"),
                ));
            }
            let mut rest2 = tail;

            let pos = match flags & FLAG_POS_MASK {
                FLAG_POS_DEFAULT => {
                    let (lid, tail) = split_bytes::<2>(rest2)?;
                    let (rid, tail) = split_bytes::<2>(tail)?;
                    rest2 = tail;
                    DecodedPos::Explicit {
                        lid: u16::from_le_bytes(lid),
                        rid: u16::from_le_bytes(rid),
                    }
                }
                FLAG_POS_FREQUENT => {
                    let (id, tail) = split_bytes::<1>(rest2)?;
                    rest2 = tail;
                    DecodedPos::FrequentPos(id[0])
                }
                FLAG_POS_SAME_AS_PREV => DecodedPos::SameAsPrev,
                _ => {
                    return Err(YomidicError::invalid_format(
                        "tokens",
                        "invalid pos form in flags",
                    ));
                }
            };

            let cost = if flags & FLAG_SMALL_COST != 0 {
                let (raw, tail) = split_bytes::<1>(rest2)?;
                rest2 = tail;
                i16::from(raw[0])
            } else {
                let (raw, tail) = split_bytes::<2>(rest2)?;
                rest2 = tail;
                i16::from_le_bytes(raw)
            };

            let value = match flags & FLAG_VALUE_MASK {
                FLAG_VALUE_DEFAULT => {
                    let (raw, tail) = split_bytes::<3>(rest2)?;
                    rest2 = tail;
                    DecodedValue::TrieId(u32::from_le_bytes([raw[0], raw[1], raw[2], 0]))
                }
                FLAG_VALUE_AS_IS_HIRAGANA => DecodedValue::AsIsHiragana,
                FLAG_VALUE_AS_IS_KATAKANA => DecodedValue::AsIsKatakana,
                _ => DecodedValue::SameAsPrev,
            };

            let attributes = if flags & FLAG_HAS_ATTRIBUTES != 0 {
                let (raw, tail) = split_bytes::<1>(rest2)?;
                rest2 = tail;
                TokenAttributes::from_bits(raw[0])
            } else {
                TokenAttributes::NONE
            };

            out.push(DecodedToken {
                pos,
                cost,
                value,
                attributes,
            });
            rest = rest2;
            if flags & FLAG_LAST_TOKEN != 0 {
                break;
            }
        }
        if !rest.is_empty() {
            return Err(YomidicError::invalid_format(
                "tokens",
                "trailing bytes after the last token",
            ));
        }
        Ok(out)
    }

    fn tokens_termination_flag(&self) -> u8 {
        TOKENS_TERMINATION_FLAG
    }

    fn section_name_for_value(&self) -> &'static str {
        "value"
    }

    fn section_name_for_key(&self) -> &'static str {
        "key"
    }

    fn section_name_for_tokens(&self) -> &'static str {
        "tokens"
    }

    fn section_name_for_pos(&self) -> &'static str {
        "pos"
    }
}

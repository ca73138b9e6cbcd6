//! テキスト辞書の読み込み
//!
//! このモジュールは、TSV形式のテキスト辞書から語彙トークンの列を
//! 読み込みます。行のフォーマットは次のとおりです:
//!
//! ```text
//! 読み <TAB> 左品詞ID <TAB> 右品詞ID <TAB> コスト <TAB> 表層形 [<TAB> 属性]
//! ```
//!
//! 6列目の属性は`SPELLING_CORRECTION`、`USER_DICTIONARY`、
//! `SUGGESTION_ONLY`のいずれかです。空行は読み飛ばします。

use std::io::Read;

use csv_core::ReadFieldResult;

use crate::errors::{Result, YomidicError};
use crate::token::{Token, TokenAttributes};

/// テキスト辞書のローダー
pub struct TextDictionaryLoader {}

impl TextDictionaryLoader {
    /// リーダーからトークン列を読み込みます。
    ///
    /// # 引数
    ///
    /// * `rdr` - テキスト辞書のリーダー
    ///
    /// # 戻り値
    ///
    /// 成功時は入力順のトークン列を返します。
    ///
    /// # エラー
    ///
    /// フォーマットが不正な場合にエラーを返します。
    pub fn from_reader<R>(mut rdr: R) -> Result<Vec<Token>>
    where
        R: Read,
    {
        let mut buf = vec![];
        rdr.read_to_end(&mut buf)?;
        Self::parse_tsv(&buf)
    }

    /// TSVバイト列からトークン列を読み込みます。
    pub fn parse_tsv(mut bytes: &[u8]) -> Result<Vec<Token>> {
        let mut tokens = vec![];

        let mut rdr = csv_core::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .build();
        let mut output = [0; 4096];
        let mut pending = vec![];
        let mut fields: Vec<String> = vec![];

        loop {
            let (result, nin, nout) = rdr.read_field(bytes, &mut output);
            pending.extend_from_slice(&output[..nout]);
            bytes = &bytes[nin..];
            match result {
                ReadFieldResult::InputEmpty => {}
                ReadFieldResult::OutputFull => {
                    return Err(YomidicError::invalid_format("lexicon", "field too large"));
                }
                ReadFieldResult::Field { record_end } => {
                    fields.push(std::str::from_utf8(&pending)?.to_string());
                    pending.clear();
                    if record_end {
                        if !(fields.len() == 1 && fields[0].is_empty()) {
                            tokens.push(Self::parse_record(&fields)?);
                        }
                        fields.clear();
                    }
                }
                ReadFieldResult::End => break,
            }
        }
        Ok(tokens)
    }

    /// 1レコード分のフィールド列をトークンに変換する
    fn parse_record(fields: &[String]) -> Result<Token> {
        if !(5..=6).contains(&fields.len()) {
            let msg = format!(
                "A row of the lexicon must have five or six fields, {:?}",
                fields.join("\t"),
            );
            return Err(YomidicError::invalid_format("lexicon", msg));
        }
        let lid = Self::parse_number(&fields[1], "left id", fields)?;
        let rid = Self::parse_number(&fields[2], "right id", fields)?;
        let cost = Self::parse_number(&fields[3], "cost", fields)?;
        let mut token = Token::new(fields[0].as_str(), fields[4].as_str(), lid, rid, cost);
        if let Some(name) = fields.get(5) {
            token.attributes = Self::parse_attribute(name)?;
        }
        Ok(token)
    }

    /// 数値フィールドをパースし、失敗時には行の内容をエラーに添える
    fn parse_number<T>(field: &str, name: &str, fields: &[String]) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        field.parse().map_err(|e| {
            YomidicError::invalid_format(
                "lexicon",
                format!("bad {name} in row {:?}: {e}", fields.join("\t")),
            )
        })
    }

    /// 属性名を属性集合に変換する
    fn parse_attribute(name: &str) -> Result<TokenAttributes> {
        match name {
            "" => Ok(TokenAttributes::NONE),
            "SPELLING_CORRECTION" => Ok(TokenAttributes::SPELLING_CORRECTION),
            "USER_DICTIONARY" => Ok(TokenAttributes::USER_DICTIONARY),
            "SUGGESTION_ONLY" => Ok(TokenAttributes::SUGGESTION_ONLY),
            _ => Err(YomidicError::invalid_format(
                "lexicon",
                format!("unknown token attribute {name:?}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tsv() {
        let data = "きょう\t10\t20\t3000\t今日\nきょう\t10\t20\t4000\t京\n";
        let tokens = TextDictionaryLoader::parse_tsv(data.as_bytes()).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0], Token::new("きょう", "今日", 10, 20, 3000));
        assert_eq!(tokens[1], Token::new("きょう", "京", 10, 20, 4000));
    }

    #[test]
    fn test_parse_tsv_without_trailing_newline() {
        let data = "あ\t1\t1\t0\tあ";
        let tokens = TextDictionaryLoader::parse_tsv(data.as_bytes()).unwrap();
        assert_eq!(tokens, vec![Token::new("あ", "あ", 1, 1, 0)]);
    }

    #[test]
    fn test_parse_tsv_skips_blank_lines() {
        let data = "あ\t1\t1\t0\tあ\n\nい\t1\t1\t0\t胃\n";
        let tokens = TextDictionaryLoader::parse_tsv(data.as_bytes()).unwrap();
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_parse_tsv_with_attribute() {
        let data = "こんにちわ\t5\t5\t100\t今日は\tSPELLING_CORRECTION\n";
        let tokens = TextDictionaryLoader::parse_tsv(data.as_bytes()).unwrap();
        assert_eq!(tokens[0].attributes, TokenAttributes::SPELLING_CORRECTION);
    }

    #[test]
    fn test_parse_tsv_unknown_attribute() {
        let data = "あ\t1\t1\t0\tあ\tNO_SUCH_ATTRIBUTE\n";
        assert!(TextDictionaryLoader::parse_tsv(data.as_bytes()).is_err());
    }

    #[test]
    fn test_parse_tsv_few_fields() {
        let data = "あ\t1\t1\n";
        assert!(TextDictionaryLoader::parse_tsv(data.as_bytes()).is_err());
    }

    #[test]
    fn test_parse_tsv_invalid_cost() {
        let data = "あ\t1\t1\tコスト\tあ\n";
        let err = TextDictionaryLoader::parse_tsv(data.as_bytes()).unwrap_err();
        assert!(matches!(err, YomidicError::InvalidFormat(_)));
        // The diagnostic names the offending row.
        assert!(err.to_string().contains("コスト"));
    }

    #[test]
    fn test_parse_tsv_invalid_left_id() {
        let data = "あ\t-1\t1\t0\tあ\n";
        let err = TextDictionaryLoader::parse_tsv(data.as_bytes()).unwrap_err();
        assert!(matches!(err, YomidicError::InvalidFormat(_)));
        assert!(err.to_string().contains("left id"));
    }

    #[test]
    fn test_from_reader() {
        let data = "かわ\t2\t2\t500\t川\n";
        let tokens = TextDictionaryLoader::from_reader(data.as_bytes()).unwrap();
        assert_eq!(tokens, vec![Token::new("かわ", "川", 2, 2, 500)]);
    }
}

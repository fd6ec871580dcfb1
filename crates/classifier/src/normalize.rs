//! Text normalization shared by rules and example matching

use unicode_segmentation::UnicodeSegmentation;

/// Replace Portuguese accented letters with their ASCII base letter
pub fn fold_diacritics(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'ª' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'º' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        other => other,
    }
}

/// Lowercase, fold diacritics, drop punctuation and collapse whitespace
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            let c = fold_char(c);
            if c.is_alphanumeric() {
                c
            } else {
                ' '
            }
        })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Words of at least three characters from already-normalized text
pub fn significant_words(normalized: &str) -> impl Iterator<Item = &str> {
    normalized
        .unicode_words()
        .filter(|w| w.chars().count() >= 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Não RECEBI  o cartão!!! "), "nao recebi o cartao");
        assert_eq!(normalize("2ª via da fatura, por favor."), "2a via da fatura por favor");
        assert_eq!(normalize("e-mail/telefone"), "e mail telefone");
        assert_eq!(normalize("???"), "");
    }

    #[test]
    fn test_fold_keeps_regex_syntax() {
        assert_eq!(fold_diacritics(r"\bcart[aã]o\b"), r"\bcart[aa]o\b");
        assert_eq!(fold_diacritics("Reclamações"), "Reclamacoes");
    }

    #[test]
    fn test_significant_words() {
        let words: Vec<&str> = significant_words("eu quero o meu saldo").collect();
        assert_eq!(words, vec!["quero", "meu", "saldo"]);
    }
}

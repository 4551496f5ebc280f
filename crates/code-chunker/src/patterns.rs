use crate::types::{PatternSet, PatternTag};
use once_cell::sync::Lazy;
use regex::Regex;

struct PatternRule {
    tag: PatternTag,
    regex: Regex,
}

fn rule(tag: PatternTag, pattern: &str) -> Option<PatternRule> {
    match Regex::new(pattern) {
        Ok(regex) => Some(PatternRule { tag, regex }),
        Err(err) => {
            log::error!("Invalid pattern for {}: {err}", tag.as_str());
            None
        }
    }
}

static RULES: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    [
        (
            PatternTag::State,
            r"\b(?:useState|useReducer|useSelector|useDispatch|useRecoilState|useRecoilValue|createSlice|createStore|configureStore|makeObservable|makeAutoObservable)\b|\bthis\.setState\s*\(",
        ),
        (
            PatternTag::Context,
            r"\b(?:createContext|useContext)\b|\.Provider\b",
        ),
        (
            PatternTag::Navigation,
            r"\b(?:useNavigation|useRoute|useRouter|NavigationContainer|create\w*Navigator)\b|\bnavigation\.(?:navigate|goBack|push|replace|reset)\s*\(",
        ),
        (
            PatternTag::Stylesheet,
            r"\bStyleSheet\.create\s*\(|\bstyled(?:\.\w+|\s*\()|\bmakeStyles\s*\(",
        ),
        (
            PatternTag::Network,
            r"\bfetch\s*\(|\baxios\b|\bXMLHttpRequest\b|\bWebSocket\b|\b(?:useQuery|useMutation|useSWR)\b|\brequests\.(?:get|post|put|patch|delete)\s*\(",
        ),
        (
            PatternTag::Hooks,
            r"\buse(?:State|Effect|Memo|Callback|Ref|Reducer|Context|LayoutEffect)\s*\(",
        ),
        (
            PatternTag::Test,
            r"(?m)^\s*(?:describe|it|test)(?:\.\w+)?\s*\(|\bexpect\s*\(",
        ),
    ]
    .into_iter()
    .filter_map(|(tag, pattern)| rule(tag, pattern))
    .collect()
});

/// Detect pattern tags in a span of code
pub fn detect(text: &str) -> PatternSet {
    RULES
        .iter()
        .filter(|rule| rule.regex.is_match(text))
        .map(|rule| rule.tag)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_detects_react_native_patterns() {
        let text = r#"
const Screen = () => {
  const [count, setCount] = useState(0);
  const navigation = useNavigation();
  useEffect(() => { fetch("/api"); }, []);
  return <View style={styles.root} />;
};
const styles = StyleSheet.create({ root: {} });
"#;
        let tags: Vec<_> = detect(text).into_iter().collect();
        assert_eq!(
            tags,
            vec![
                PatternTag::State,
                PatternTag::Navigation,
                PatternTag::Stylesheet,
                PatternTag::Network,
                PatternTag::Hooks,
            ]
        );
    }

    #[test]
    fn test_context_and_tests() {
        let text = "const Ctx = createContext(null);\ndescribe('x', () => {\n  it('works', () => expect(1).toBe(1));\n});";
        let tags = detect(text);
        assert!(tags.contains(&PatternTag::Context));
        assert!(tags.contains(&PatternTag::Test));
        assert!(!tags.contains(&PatternTag::State));
    }

    #[test]
    fn test_plain_code_has_no_patterns() {
        assert!(detect("function add(a, b) {\n  return a + b;\n}\n").is_empty());
    }
}

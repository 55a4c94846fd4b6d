//! Serialization of nodes back to markup.

use crate::{NodeId, NodeType, Tree};
use tagsoup_grammar::Grammar;

impl Tree {
    /// Start tag of an element, attributes in insertion order.
    pub fn start_tag(&self, id: NodeId, grammar: &dyn Grammar) -> Option<String> {
        let node = self.get(id)?;
        let name = node.tag_name()?;
        Some(grammar.start_tag_text(name, &mut node.attributes().iter()))
    }

    /// End tag of an element.
    pub fn end_tag(&self, id: NodeId, grammar: &dyn Grammar) -> Option<String> {
        let name = self.get(id)?.tag_name()?;
        Some(grammar.end_tag_text(name))
    }

    /// Self-closing form of an element.
    pub fn singular_tag(&self, id: NodeId, grammar: &dyn Grammar) -> Option<String> {
        let node = self.get(id)?;
        let name = node.tag_name()?;
        Some(grammar.singular_tag_text(name, &mut node.attributes().iter()))
    }

    /// Serialize the subtree at `id`.
    ///
    /// Data is escaped through the grammar except below elements whose
    /// content the grammar treats as opaque.
    pub fn to_markup(&self, id: NodeId, grammar: &dyn Grammar) -> String {
        let mut out = String::new();
        self.write_markup(id, grammar, &mut out);
        out
    }

    fn write_markup(&self, id: NodeId, grammar: &dyn Grammar, out: &mut String) {
        let Some(node) = self.get(id) else {
            return;
        };
        match node.node_type() {
            NodeType::Root => {
                for &child in node.children() {
                    self.write_markup(child, grammar, out);
                }
            }
            NodeType::Element(name) => {
                if node.children().is_empty() && grammar.is_singular(name) {
                    let tag = if grammar.strict_xml() {
                        self.singular_tag(id, grammar)
                    } else {
                        self.start_tag(id, grammar)
                    };
                    out.push_str(&tag.unwrap_or_default());
                    return;
                }
                out.push_str(&self.start_tag(id, grammar).unwrap_or_default());
                for &child in node.children() {
                    self.write_markup(child, grammar, out);
                }
                out.push_str(&grammar.end_tag_text(name));
            }
            NodeType::Data => {
                let value = node.value().unwrap_or_default();
                let opaque = node
                    .parent()
                    .and_then(|parent| self.get(parent))
                    .and_then(|parent| parent.tag_name())
                    .is_some_and(|parent| grammar.wait_for_end_tag(parent));
                if opaque {
                    out.push_str(value);
                } else {
                    out.push_str(&grammar.encode(value));
                }
            }
            NodeType::Comment | NodeType::Declaration => {
                out.push_str(node.value().unwrap_or_default());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{AttributeSet, NodeId, NodeType, Tree};
    use tagsoup_grammar::BasicGrammar;

    #[test]
    fn test_tags_follow_insertion_order() {
        let grammar = BasicGrammar::html();
        let mut tree = Tree::new();
        let attrs: AttributeSet = [("Id", "x"), ("class", "a b")].into_iter().collect();
        let a = tree.create_element(NodeId::ROOT, "a", attrs).unwrap();
        assert_eq!(
            tree.start_tag(a, &grammar).unwrap(),
            "<a Id=\"x\" class=\"a b\">"
        );
        assert_eq!(tree.end_tag(a, &grammar).unwrap(), "</a>");
        assert_eq!(
            tree.singular_tag(a, &grammar).unwrap(),
            "<a Id=\"x\" class=\"a b\"/>"
        );
    }

    #[test]
    fn test_non_elements_have_no_tags() {
        let grammar = BasicGrammar::html();
        let mut tree = Tree::new();
        let text = tree.create_leaf(NodeId::ROOT, NodeType::Data, "x").unwrap();
        assert!(tree.start_tag(text, &grammar).is_none());
        assert!(tree.end_tag(NodeId::ROOT, &grammar).is_none());
    }

    #[test]
    fn test_to_markup_escapes_data() {
        let grammar = BasicGrammar::html();
        let mut tree = Tree::new();
        let p = tree.create_element(NodeId::ROOT, "p", AttributeSet::new()).unwrap();
        tree.create_leaf(p, NodeType::Data, "a < b & c").unwrap();
        tree.create_element(p, "br", AttributeSet::new()).unwrap();
        tree.create_leaf(p, NodeType::Comment, "<!-- note -->").unwrap();
        assert_eq!(
            tree.to_markup(NodeId::ROOT, &grammar),
            "<p>a &lt; b &amp; c<br><!-- note --></p>"
        );
    }

    #[test]
    fn test_to_markup_keeps_opaque_content() {
        let grammar = BasicGrammar::html();
        let mut tree = Tree::new();
        let script = tree
            .create_element(NodeId::ROOT, "script", AttributeSet::new())
            .unwrap();
        tree.create_leaf(script, NodeType::Data, "if (a < b) {}").unwrap();
        assert_eq!(
            tree.to_markup(NodeId::ROOT, &grammar),
            "<script>if (a < b) {}</script>"
        );
    }

    #[test]
    fn test_strict_singular_serialization() {
        let grammar = BasicGrammar::xml().with_singular_tags(["br"]);
        let mut tree = Tree::new();
        let root = tree.create_element(NodeId::ROOT, "doc", AttributeSet::new()).unwrap();
        tree.create_element(root, "br", AttributeSet::new()).unwrap();
        tree.create_element(root, "empty", AttributeSet::new()).unwrap();
        assert_eq!(
            tree.to_markup(NodeId::ROOT, &grammar),
            "<doc><br/><empty></empty></doc>"
        );
    }
}
